//! Protocol-2 pickle assembler.
//!
//! Emits the same opcode shapes Ren'Py's own pickler produces, so fixtures can
//! be written as code instead of checked-in binaries:
//!
//! ```
//! use cracken_core::pickle::{loads, AllowList, PickleWriter};
//!
//! let mut w = PickleWriter::new();
//! w.object("renpy.ast", "Pass", |w| {
//!     w.str("linenumber").int(3);
//! });
//! let v = loads(&w.finish(), &AllowList::script()).unwrap();
//! assert_eq!(v.class().unwrap().qualified(), "renpy.ast.Pass");
//! ```

use super::op;

/// Fluent opcode writer. Every method appends and returns `&mut Self`.
#[derive(Debug, Clone)]
pub struct PickleWriter {
    buf: Vec<u8>,
}

impl Default for PickleWriter {
    fn default() -> Self { Self::new() }
}

impl PickleWriter {
    /// Starts a protocol-2 stream.
    pub fn new() -> Self { Self { buf: vec![op::PROTO, 2] } }

    /// Appends STOP and returns the stream.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(op::STOP);
        self.buf
    }

    fn emit(&mut self, code: u8, arg: &[u8]) -> &mut Self {
        self.buf.push(code);
        self.raw(arg)
    }

    /// Raw bytes, for malformed-input tests.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Single argument-less opcode.
    pub fn op(&mut self, code: u8) -> &mut Self { self.emit(code, &[]) }

    /* ───── scalars ───── */

    /// `None`.
    pub fn none(&mut self) -> &mut Self { self.op(op::NONE) }
    /// `True` / `False`.
    pub fn bool(&mut self, v: bool) -> &mut Self { self.op(if v { op::NEWTRUE } else { op::NEWFALSE }) }

    /// Smallest integer encoding that fits.
    pub fn int(&mut self, v: i64) -> &mut Self {
        if let Ok(b) = u8::try_from(v) {
            self.emit(op::BININT1, &[b]);
        } else if let Ok(h) = u16::try_from(v) {
            self.emit(op::BININT2, &h.to_le_bytes());
        } else if let Ok(i) = i32::try_from(v) {
            self.emit(op::BININT, &i.to_le_bytes());
        } else {
            let bytes = v.to_le_bytes();
            let mut n = 8;
            // trim redundant sign bytes
            while n > 1 {
                let (top, next) = (bytes[n - 1], bytes[n - 2]);
                if (top == 0 && next & 0x80 == 0) || (top == 0xff && next & 0x80 != 0) {
                    n -= 1;
                } else {
                    break;
                }
            }
            self.emit(op::LONG1, &[n as u8]).raw(&bytes[..n]);
        }
        self
    }

    /// Big-endian `BINFLOAT`.
    pub fn float(&mut self, v: f64) -> &mut Self {
        self.emit(op::BINFLOAT, &v.to_be_bytes())
    }

    /// UTF-8 text (`BINUNICODE`).
    pub fn str(&mut self, s: &str) -> &mut Self {
        self.emit(op::BINUNICODE, &(s.len() as u32).to_le_bytes()).raw(s.as_bytes())
    }

    /// Raw bytes (`SHORT_BINBYTES` / `BINBYTES`).
    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        if let Ok(n) = u8::try_from(b.len()) {
            self.emit(op::SHORT_BINBYTES, &[n]);
        } else {
            self.emit(op::BINBYTES, &(b.len() as u32).to_le_bytes());
        }
        self.raw(b)
    }

    /* ───── containers ───── */

    /// MARK.
    pub fn mark(&mut self) -> &mut Self { self.op(op::MARK) }
    /// POP.
    pub fn pop(&mut self) -> &mut Self { self.op(op::POP) }

    /// `MARK <items> LIST`.
    pub fn list(&mut self, items: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        items(self);
        self.op(op::LIST)
    }

    /// `MARK <items> TUPLE`.
    pub fn tuple(&mut self, items: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        items(self);
        self.op(op::TUPLE)
    }

    /// `MARK <key value ...> DICT`.
    pub fn dict(&mut self, entries: impl FnOnce(&mut Self)) -> &mut Self {
        self.mark();
        entries(self);
        self.op(op::DICT)
    }

    /// Packs the top value into a 1-tuple.
    pub fn tuple1(&mut self) -> &mut Self { self.op(op::TUPLE1) }
    /// Packs the top two values into a tuple.
    pub fn tuple2(&mut self) -> &mut Self { self.op(op::TUPLE2) }
    /// Packs the top three values into a tuple.
    pub fn tuple3(&mut self) -> &mut Self { self.op(op::TUPLE3) }
    /// APPEND.
    pub fn append(&mut self) -> &mut Self { self.op(op::APPEND) }
    /// SETITEM.
    pub fn setitem(&mut self) -> &mut Self { self.op(op::SETITEM) }

    /* ───── memo ───── */

    /// `BINPUT` / `LONG_BINPUT`.
    pub fn put(&mut self, id: u32) -> &mut Self {
        if let Ok(b) = u8::try_from(id) {
            self.emit(op::BINPUT, &[b])
        } else {
            self.emit(op::LONG_BINPUT, &id.to_le_bytes())
        }
    }

    /// `BINGET` / `LONG_BINGET`.
    pub fn get(&mut self, id: u32) -> &mut Self {
        if let Ok(b) = u8::try_from(id) {
            self.emit(op::BINGET, &[b])
        } else {
            self.emit(op::LONG_BINGET, &id.to_le_bytes())
        }
    }

    /// MEMOIZE.
    pub fn memoize(&mut self) -> &mut Self { self.op(op::MEMOIZE) }

    /* ───── classes ───── */

    /// `GLOBAL module\nname\n`.
    pub fn global(&mut self, module: &str, name: &str) -> &mut Self {
        self.emit(op::GLOBAL, module.as_bytes()).raw(b"\n").raw(name.as_bytes()).raw(b"\n")
    }

    /// NEWOBJ.
    pub fn newobj(&mut self) -> &mut Self { self.op(op::NEWOBJ) }
    /// REDUCE.
    pub fn reduce(&mut self) -> &mut Self { self.op(op::REDUCE) }
    /// BUILD.
    pub fn build(&mut self) -> &mut Self { self.op(op::BUILD) }

    /// `cls.__new__(cls)` followed by a dict `BUILD`, the shape used for every
    /// Ren'Py node. `fields` pushes alternating keys and values.
    pub fn object(&mut self, module: &str, name: &str, fields: impl FnOnce(&mut Self)) -> &mut Self {
        self.global(module, name).op(op::EMPTY_TUPLE).newobj().op(op::EMPTY_DICT).mark();
        fields(self);
        self.op(op::SETITEMS).build()
    }

    /// `cls(*args)` via REDUCE; `args` pushes the positional arguments.
    pub fn call(&mut self, module: &str, name: &str, args: impl FnOnce(&mut Self)) -> &mut Self {
        self.global(module, name).tuple(args).reduce()
    }
}
