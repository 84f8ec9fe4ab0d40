//! Minimal protobuf wire-format reader.
//!
//! Only what `onnx.proto` needs: varints, 32/64-bit fixed values and
//! length-delimited payloads. Groups (wire types 3 and 4) are rejected.

use crate::error::{LoadError, Result};

/// One decoded field payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// Iterates over `(field_number, payload)` pairs of one message.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    /// `context` names the message being decoded, for error messages.
    pub fn new(buf: &'a [u8], context: &'static str) -> Self {
        Reader {
            buf,
            pos: 0,
            context,
        }
    }

    fn error(&self, message: impl Into<String>) -> LoadError {
        LoadError::decode(self.context, message)
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(self.error("truncated varint"));
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.error("varint longer than 10 bytes"))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| self.error(format!("field of {} bytes overruns message", n)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// The next field, or `None` at the end of the message.
    pub fn next_field(&mut self) -> Result<Option<(u32, Payload<'a>)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        let payload = match key & 0x7 {
            0 => Payload::Varint(self.read_varint()?),
            1 => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Payload::Fixed64(u64::from_le_bytes(raw))
            }
            2 => {
                let len = self.read_varint()? as usize;
                Payload::Bytes(self.take(len)?)
            }
            5 => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                Payload::Fixed32(u32::from_le_bytes(raw))
            }
            other => return Err(self.error(format!("unsupported wire type {}", other))),
        };
        Ok(Some((field, payload)))
    }
}

impl<'a> Payload<'a> {
    pub fn as_i64(&self, context: &'static str) -> Result<i64> {
        match self {
            Payload::Varint(v) => Ok(*v as i64),
            _ => Err(LoadError::decode(context, "expected varint")),
        }
    }

    pub fn as_f32(&self, context: &'static str) -> Result<f32> {
        match self {
            Payload::Fixed32(v) => Ok(f32::from_bits(*v)),
            _ => Err(LoadError::decode(context, "expected 32-bit float")),
        }
    }

    pub fn as_bytes(&self, context: &'static str) -> Result<&'a [u8]> {
        match self {
            Payload::Bytes(b) => Ok(b),
            _ => Err(LoadError::decode(context, "expected length-delimited field")),
        }
    }

    pub fn as_string(&self, context: &'static str) -> Result<String> {
        let bytes = self.as_bytes(context)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| LoadError::decode(context, "string is not valid UTF-8"))
    }

    /// Append a repeated varint field, packed or not.
    pub fn extend_i64(&self, out: &mut Vec<i64>, context: &'static str) -> Result<()> {
        match self {
            Payload::Varint(v) => out.push(*v as i64),
            Payload::Bytes(b) => {
                let mut r = Reader::new(b, context);
                while r.pos < b.len() {
                    out.push(r.read_varint()? as i64);
                }
            }
            _ => return Err(LoadError::decode(context, "expected varint list")),
        }
        Ok(())
    }

    /// Append a repeated `float` field, packed or not.
    pub fn extend_f32(&self, out: &mut Vec<f32>, context: &'static str) -> Result<()> {
        match self {
            Payload::Fixed32(v) => out.push(f32::from_bits(*v)),
            Payload::Bytes(b) => {
                if b.len() % 4 != 0 {
                    return Err(LoadError::decode(context, "packed floats not a multiple of 4 bytes"));
                }
                out.extend(
                    b.chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                );
            }
            _ => return Err(LoadError::decode(context, "expected float list")),
        }
        Ok(())
    }

    /// Append a repeated `double` field, packed or not.
    pub fn extend_f64(&self, out: &mut Vec<f64>, context: &'static str) -> Result<()> {
        match self {
            Payload::Fixed64(v) => out.push(f64::from_bits(*v)),
            Payload::Bytes(b) => {
                if b.len() % 8 != 0 {
                    return Err(LoadError::decode(context, "packed doubles not a multiple of 8 bytes"));
                }
                out.extend(b.chunks_exact(8).map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    f64::from_le_bytes(raw)
                }));
            }
            _ => return Err(LoadError::decode(context, "expected double list")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_and_bytes() {
        // field 1 varint 300, field 2 bytes "hi"
        let buf = [0x08, 0xac, 0x02, 0x12, 0x02, b'h', b'i'];
        let mut r = Reader::new(&buf, "test");
        assert_eq!(r.next_field().unwrap(), Some((1, Payload::Varint(300))));
        let (field, payload) = r.next_field().unwrap().unwrap();
        assert_eq!(field, 2);
        assert_eq!(payload.as_string("test").unwrap(), "hi");
        assert_eq!(r.next_field().unwrap(), None);
    }

    #[test]
    fn test_negative_int64_varint() {
        // -1 as int64 is ten bytes of 0xff..0x01
        let mut buf = vec![0x08];
        buf.extend([0xff; 9]);
        buf.push(0x01);
        let mut r = Reader::new(&buf, "test");
        let (_, p) = r.next_field().unwrap().unwrap();
        assert_eq!(p.as_i64("test").unwrap(), -1);
    }

    #[test]
    fn test_packed_repeated() {
        let packed = [1u8, 2, 0x96, 0x01];
        let mut out = Vec::new();
        Payload::Bytes(&packed).extend_i64(&mut out, "test").unwrap();
        Payload::Varint(7).extend_i64(&mut out, "test").unwrap();
        assert_eq!(out, vec![1, 2, 150, 7]);

        let mut floats = Vec::new();
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        Payload::Bytes(&bytes).extend_f32(&mut floats, "test").unwrap();
        assert_eq!(floats, vec![1.5, -2.0]);
    }

    #[test]
    fn test_truncated() {
        let buf = [0x12, 0x05, b'a'];
        let mut r = Reader::new(&buf, "test");
        assert!(matches!(r.next_field(), Err(LoadError::Decode { .. })));
        let mut r = Reader::new(&[0x08, 0x80], "test");
        assert!(r.next_field().is_err());
    }

    #[test]
    fn test_group_wire_type_rejected() {
        let mut r = Reader::new(&[0x0b], "test");
        assert!(r.next_field().is_err());
    }
}
