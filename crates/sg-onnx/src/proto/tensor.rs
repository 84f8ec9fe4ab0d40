use sg_tensor::{CpuStorage, DType, Shape, Tensor};

use super::wire::Reader;
use crate::error::{LoadError, Result};

const CTX: &str = "TensorProto";

/// `TensorProto.DataType` ids the loader accepts.
pub mod data_type {
    pub const FLOAT: i32 = 1;
    pub const INT32: i32 = 6;
    pub const INT64: i32 = 7;
    pub const STRING: i32 = 8;
    pub const BOOL: i32 = 9;
    pub const FLOAT16: i32 = 10;
    pub const DOUBLE: i32 = 11;
}

/// Runtime dtype for an ONNX element type. INT32 and FLOAT16 are widened to
/// int64 and float32; `0` (undefined) maps to `None`.
pub fn widened_dtype(id: i32) -> Result<Option<DType>> {
    match id {
        0 => Ok(None),
        data_type::INT32 => Ok(Some(DType::I64)),
        data_type::FLOAT16 => Ok(Some(DType::F32)),
        other => DType::from_onnx_type(other)
            .map(Some)
            .ok_or(LoadError::UnsupportedElemType(other)),
    }
}

/// Decode a `TensorProto` into its name and value.
pub fn decode_tensor(buf: &[u8]) -> Result<(String, Tensor)> {
    let mut dims: Vec<i64> = Vec::new();
    let mut elem_type = 0i32;
    let mut name = String::new();
    let mut raw: Option<&[u8]> = None;
    let mut floats: Vec<f32> = Vec::new();
    let mut int32s: Vec<i64> = Vec::new();
    let mut int64s: Vec<i64> = Vec::new();
    let mut doubles: Vec<f64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut external = false;

    let mut r = Reader::new(buf, CTX);
    while let Some((field, payload)) = r.next_field()? {
        match field {
            1 => payload.extend_i64(&mut dims, CTX)?,
            2 => elem_type = payload.as_i64(CTX)? as i32,
            4 => payload.extend_f32(&mut floats, CTX)?,
            5 => payload.extend_i64(&mut int32s, CTX)?,
            6 => strings.push(payload.as_string(CTX)?),
            7 => payload.extend_i64(&mut int64s, CTX)?,
            8 => name = payload.as_string(CTX)?,
            9 => raw = Some(payload.as_bytes(CTX)?),
            10 => payload.extend_f64(&mut doubles, CTX)?,
            13 => external = true,
            14 => external |= payload.as_i64(CTX)? == 1,
            _ => {}
        }
    }
    if external {
        return Err(LoadError::ExternalData(name));
    }

    let dims = dims
        .iter()
        .map(|&d| {
            usize::try_from(d)
                .map_err(|_| LoadError::decode(CTX, format!("negative dimension {} in '{}'", d, name)))
        })
        .collect::<Result<Vec<usize>>>()?;
    let shape = Shape::new(dims);
    if shape.checked_numel().is_none() {
        return Err(LoadError::decode(
            CTX,
            format!("element count of {:?} in '{}' overflows", shape.dims(), name),
        ));
    }

    let storage = match elem_type {
        data_type::FLOAT => match raw {
            Some(b) => CpuStorage::F32(le_chunks::<4, _, _>(b, f32::from_le_bytes)?),
            None => CpuStorage::F32(floats),
        },
        data_type::DOUBLE => match raw {
            Some(b) => CpuStorage::F64(le_chunks::<8, _, _>(b, f64::from_le_bytes)?),
            None => CpuStorage::F64(doubles),
        },
        data_type::INT64 => match raw {
            Some(b) => CpuStorage::I64(le_chunks::<8, _, _>(b, i64::from_le_bytes)?),
            None => CpuStorage::I64(int64s),
        },
        data_type::INT32 => match raw {
            Some(b) => CpuStorage::I64(le_chunks::<4, _, _>(b, |c| i32::from_le_bytes(c) as i64)?),
            None => CpuStorage::I64(int32s),
        },
        data_type::BOOL => match raw {
            Some(b) => CpuStorage::Bool(b.iter().map(|&x| x != 0).collect()),
            None => CpuStorage::Bool(int32s.iter().map(|&x| x != 0).collect()),
        },
        data_type::FLOAT16 => match raw {
            Some(b) => CpuStorage::F32(le_chunks::<2, _, _>(b, |c| half::f16::from_le_bytes(c).to_f32())?),
            // float16 values travel as their bit patterns in int32_data
            None => CpuStorage::F32(
                int32s
                    .iter()
                    .map(|&bits| half::f16::from_bits(bits as u16).to_f32())
                    .collect(),
            ),
        },
        data_type::STRING => CpuStorage::Str(strings),
        other => return Err(LoadError::UnsupportedElemType(other)),
    };

    let tensor = Tensor::new(storage, shape)?;
    Ok((name, tensor))
}

/// Reinterpret little-endian bytes as fixed-width values.
fn le_chunks<const N: usize, T, F>(bytes: &[u8], convert: F) -> Result<Vec<T>>
where
    F: Fn([u8; N]) -> T,
{
    if bytes.len() % N != 0 {
        return Err(LoadError::decode(
            CTX,
            format!("raw_data length {} is not a multiple of {}", bytes.len(), N),
        ));
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|c| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(c);
            convert(raw)
        })
        .collect())
}
