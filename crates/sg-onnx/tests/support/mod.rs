//! Test-only protobuf encoder producing ONNX messages.
#![allow(dead_code)]

#[derive(Default, Clone)]
pub struct Pb {
    buf: Vec<u8>,
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

impl Pb {
    pub fn new() -> Self {
        Pb::default()
    }

    fn key(&mut self, field: u32, wire: u8) {
        put_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire));
    }

    pub fn int(mut self, field: u32, v: i64) -> Self {
        self.key(field, 0);
        put_varint(&mut self.buf, v as u64);
        self
    }

    pub fn float(mut self, field: u32, v: f32) -> Self {
        self.key(field, 5);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn double(mut self, field: u32, v: f64) -> Self {
        self.key(field, 1);
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(mut self, field: u32, data: &[u8]) -> Self {
        self.key(field, 2);
        put_varint(&mut self.buf, data.len() as u64);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn string(self, field: u32, s: &str) -> Self {
        self.bytes(field, s.as_bytes())
    }

    pub fn message(self, field: u32, msg: Pb) -> Self {
        self.bytes(field, &msg.buf)
    }

    pub fn packed_ints(self, field: u32, values: &[i64]) -> Self {
        let mut payload = Vec::new();
        for &v in values {
            put_varint(&mut payload, v as u64);
        }
        self.bytes(field, &payload)
    }

    pub fn packed_floats(self, field: u32, values: &[f32]) -> Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(field, &payload)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub enum Dim<'a> {
    Value(i64),
    Param(&'a str),
    Free,
}

pub fn tensor_type(elem_type: i32, dims: &[Dim]) -> Pb {
    let mut shape = Pb::new();
    for d in dims {
        let dim = match d {
            Dim::Value(v) => Pb::new().int(1, *v),
            Dim::Param(p) => Pb::new().string(2, p),
            Dim::Free => Pb::new(),
        };
        shape = shape.message(1, dim);
    }
    Pb::new().message(1, Pb::new().int(1, elem_type as i64).message(2, shape))
}

pub fn value_info(name: &str, ty: Pb) -> Pb {
    Pb::new().string(1, name).message(2, ty)
}

pub fn float_tensor(name: &str, dims: &[i64], data: &[f32]) -> Pb {
    let mut t = Pb::new();
    for &d in dims {
        t = t.int(1, d);
    }
    t.int(2, 1).packed_floats(4, data).string(8, name)
}

pub fn node(op_type: &str, inputs: &[&str], outputs: &[&str], attrs: Vec<Pb>) -> Pb {
    let mut n = Pb::new();
    for i in inputs {
        n = n.string(1, i);
    }
    for o in outputs {
        n = n.string(2, o);
    }
    n = n.string(4, op_type);
    for a in attrs {
        n = n.message(5, a);
    }
    n
}

pub fn attr_int(name: &str, v: i64) -> Pb {
    Pb::new().string(1, name).int(3, v).int(20, 2)
}

pub fn attr_graph(name: &str, graph: Pb) -> Pb {
    Pb::new().string(1, name).message(6, graph).int(20, 5)
}

pub fn model(graph: Pb, opsets: &[(&str, i64)]) -> Vec<u8> {
    let mut m = Pb::new()
        .int(1, 8)
        .string(2, "stepgraph-tests")
        .string(3, "0.1")
        .int(5, 3)
        .message(7, graph);
    for (domain, version) in opsets {
        m = m.message(8, Pb::new().string(1, domain).int(2, *version));
    }
    m.finish()
}
