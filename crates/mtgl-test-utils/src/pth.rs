//! Minimal PyTorch state-dict writer.
//!
//! Produces the zip layout `torch.save` uses for a flat `{name: tensor}`
//! dict: a protocol-2 pickle at `archive/data.pkl` plus one raw
//! little-endian f32 storage per tensor under `archive/data/`.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use candle_core::{DType, Tensor};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const PROTO: u8 = 0x80;
const EMPTY_DICT: u8 = b'}';
const MARK: u8 = b'(';
const BINUNICODE: u8 = b'X';
const GLOBAL: u8 = b'c';
const BININT: u8 = b'J';
const TUPLE: u8 = b't';
const BINPERSID: u8 = b'Q';
const NEWFALSE: u8 = 0x89;
const REDUCE: u8 = b'R';
const SETITEMS: u8 = b'u';
const STOP: u8 = b'.';

struct Pickle(Vec<u8>);

impl Pickle {
    fn op(&mut self, op: u8) {
        self.0.push(op);
    }

    fn str(&mut self, s: &str) {
        self.op(BINUNICODE);
        self.0.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
    }

    fn global(&mut self, module: &str, name: &str) {
        self.op(GLOBAL);
        self.0.extend_from_slice(format!("{module}\n{name}\n").as_bytes());
    }

    fn int(&mut self, v: usize) {
        self.op(BININT);
        self.0.extend_from_slice(&(v as i32).to_le_bytes());
    }

    fn int_tuple(&mut self, values: &[usize]) {
        self.op(MARK);
        for &v in values {
            self.int(v);
        }
        self.op(TUPLE);
    }

    /// `torch._utils._rebuild_tensor_v2(storage, 0, size, stride, False, {})`
    fn tensor(&mut self, key: &str, dims: &[usize]) {
        let numel = dims.iter().product();
        let mut stride = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            stride[i] = stride[i + 1] * dims[i + 1];
        }

        self.global("torch._utils", "_rebuild_tensor_v2");
        self.op(MARK);
        self.op(MARK);
        self.str("storage");
        self.global("torch", "FloatStorage");
        self.str(key);
        self.str("cpu");
        self.int(numel);
        self.op(TUPLE);
        self.op(BINPERSID);
        self.int(0);
        self.int_tuple(dims);
        self.int_tuple(&stride);
        self.op(NEWFALSE);
        self.op(EMPTY_DICT);
        self.op(TUPLE);
        self.op(REDUCE);
    }
}

/// Write `tensors` as a `.pth` state dict, stored as f32.
pub fn write_state_dict_pth(path: &Path, tensors: &[(String, Tensor)]) -> Result<()> {
    let mut pickle = Pickle(vec![PROTO, 2]);
    pickle.op(EMPTY_DICT);
    pickle.op(MARK);
    for (i, (name, tensor)) in tensors.iter().enumerate() {
        pickle.str(name);
        pickle.tensor(&i.to_string(), tensor.dims());
    }
    pickle.op(SETITEMS);
    pickle.op(STOP);

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(std::fs::File::create(path)?);
    zip.start_file("archive/data.pkl", options)?;
    zip.write_all(&pickle.0)?;
    for (i, (_, tensor)) in tensors.iter().enumerate() {
        let values = tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        zip.start_file(format!("archive/data/{i}"), options)?;
        zip.write_all(&bytes)?;
    }
    zip.finish()?;
    Ok(())
}
