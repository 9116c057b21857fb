//! The `Unpickler` stack machine.
//!
//! Flat operand stack plus a separate stack of MARK positions. The slice of the
//! operand stack above the newest mark is the "current frame": pops never reach
//! below it. Decoding is iterative, so hostile nesting cannot blow the call
//! stack.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::{
    allow::{AllowList, Builtin},
    op,
    value::{dict_insert, Object, Value},
    DecodeError, PickleError, PickleResult,
};
use crate::ByteReader;

/// Decodes one pickle stream against an allow-list.
pub fn loads(data: &[u8], allow: &AllowList) -> PickleResult<Value> { Unpickler::new(data, allow).load() }

/// Restricted pickle interpreter.
pub struct Unpickler<'a> {
    r: ByteReader<'a>,
    allow: &'a AllowList,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
}

impl<'a> Unpickler<'a> {
    /// New interpreter positioned at the start of `data`.
    pub fn new(data: &'a [u8], allow: &'a AllowList) -> Self {
        Self { r: ByteReader::new(data), allow, stack: Vec::new(), marks: Vec::new(), memo: HashMap::new() }
    }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> usize { self.r.offset() }

    /// Runs until STOP and returns the top of the stack.
    pub fn load(&mut self) -> PickleResult<Value> {
        loop {
            let at = self.r.offset();
            let code = self.r.read_u8()?;
            if code == op::STOP {
                let v = self.pop(at)?;
                log::trace!("pickle: STOP at {at}, memo={} entries", self.memo.len());
                return Ok(v);
            }
            self.step(code, at)?;
        }
    }

    fn step(&mut self, code: u8, at: usize) -> PickleResult<()> {
        match code {
            op::PROTO => {
                let proto = self.r.read_u8()?;
                if proto > 5 {
                    return Err(malformed(at, format!("unsupported protocol {proto}")));
                }
            }
            op::FRAME => {
                self.r.read_u64_le()?;
            }
            op::MARK => self.marks.push(self.stack.len()),
            op::POP => {
                if self.marks.last() == Some(&self.stack.len()) {
                    self.marks.pop();
                } else {
                    self.pop(at)?;
                }
            }
            op::POP_MARK => {
                self.pop_mark(at)?;
            }
            op::DUP => {
                let top = self.top(at)?;
                self.stack.push(top);
            }

            /* ───── scalars ───── */
            op::NONE => self.stack.push(Value::None),
            op::NEWTRUE => self.stack.push(Value::Bool(true)),
            op::NEWFALSE => self.stack.push(Value::Bool(false)),
            op::INT => {
                let line = self.line_str(at)?;
                let v = match line {
                    "01" => Value::Bool(true),
                    "00" => Value::Bool(false),
                    s => Value::Int(parse_int(s, at)?),
                };
                self.stack.push(v);
            }
            op::BININT => {
                let v = self.r.read_i32_le()?;
                self.stack.push(Value::Int(i64::from(v)));
            }
            op::BININT1 => {
                let v = self.r.read_u8()?;
                self.stack.push(Value::Int(i64::from(v)));
            }
            op::BININT2 => {
                let v = self.r.read_u16_le()?;
                self.stack.push(Value::Int(i64::from(v)));
            }
            op::LONG => {
                let line = self.line_str(at)?;
                let v = parse_int(line.strip_suffix('L').unwrap_or(line), at)?;
                self.stack.push(Value::Int(v));
            }
            op::LONG1 => {
                let n = usize::from(self.r.read_u8()?);
                let bytes = self.r.read_bytes(n)?;
                self.stack.push(Value::Int(decode_long(bytes, at)?));
            }
            op::LONG4 => {
                let n = self.r.read_i32_le()?;
                let n = usize::try_from(n).map_err(|_| malformed(at, "negative LONG4 length"))?;
                let bytes = self.r.read_bytes(n)?;
                self.stack.push(Value::Int(decode_long(bytes, at)?));
            }
            op::FLOAT => {
                let line = self.line_str(at)?;
                let v = line.trim().parse::<f64>().map_err(|_| malformed(at, format!("bad float literal {line:?}")))?;
                self.stack.push(Value::Float(v));
            }
            op::BINFLOAT => {
                let v = self.r.read_f64_be()?;
                self.stack.push(Value::Float(v));
            }

            /* ───── text and bytes ───── */
            op::STRING => {
                let line = self.r.read_line()?;
                let body = strip_quotes(line).ok_or_else(|| malformed(at, "STRING literal is not quoted"))?;
                let raw = unescape_bytes(body);
                self.stack.push(Value::from(latin1(&raw)));
            }
            op::BINSTRING => {
                let n = self.r.read_i32_le()?;
                let n = usize::try_from(n).map_err(|_| malformed(at, "negative BINSTRING length"))?;
                let raw = self.r.read_bytes(n)?;
                self.stack.push(Value::from(latin1(raw)));
            }
            op::SHORT_BINSTRING => {
                let n = usize::from(self.r.read_u8()?);
                let raw = self.r.read_bytes(n)?;
                self.stack.push(Value::from(latin1(raw)));
            }
            op::UNICODE => {
                let line = self.r.read_line()?;
                let s = raw_unicode_escape(line).ok_or(DecodeError::InvalidUtf8 { offset: at })?;
                self.stack.push(Value::from(s));
            }
            op::BINUNICODE => {
                let n = self.r.read_u32_le()? as usize;
                self.push_utf8(n, at)?;
            }
            op::SHORT_BINUNICODE => {
                let n = usize::from(self.r.read_u8()?);
                self.push_utf8(n, at)?;
            }
            op::BINUNICODE8 => {
                let n = self.r.read_len_u64_le()?;
                self.push_utf8(n, at)?;
            }
            op::BINBYTES => {
                let n = self.r.read_u32_le()? as usize;
                self.push_bytes(n)?;
            }
            op::SHORT_BINBYTES => {
                let n = usize::from(self.r.read_u8()?);
                self.push_bytes(n)?;
            }
            op::BINBYTES8 | op::BYTEARRAY8 => {
                let n = self.r.read_len_u64_le()?;
                self.push_bytes(n)?;
            }

            /* ───── containers ───── */
            op::EMPTY_LIST => self.stack.push(Value::new_list(Vec::new())),
            op::EMPTY_DICT => self.stack.push(Value::new_dict(Vec::new())),
            op::EMPTY_SET => self.stack.push(Value::new_set(Vec::new())),
            op::EMPTY_TUPLE => self.stack.push(Value::tuple(Vec::new())),
            op::LIST => {
                let items = self.pop_mark(at)?;
                self.stack.push(Value::new_list(items));
            }
            op::TUPLE => {
                let items = self.pop_mark(at)?;
                self.stack.push(Value::tuple(items));
            }
            op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                let n = usize::from(code - op::TUPLE1) + 1;
                let items = self.pop_n(n, at)?;
                self.stack.push(Value::tuple(items));
            }
            op::DICT => {
                let items = self.pop_mark(at)?;
                let entries = pairs(items, at)?;
                let mut dict = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    dict_insert(&mut dict, k, v);
                }
                self.stack.push(Value::new_dict(dict));
            }
            op::FROZENSET => {
                let items = self.pop_mark(at)?;
                self.stack.push(set_of(items));
            }
            op::APPEND => {
                let v = self.pop(at)?;
                let target = self.top(at)?;
                extend_list(&target, vec![v], at)?;
            }
            op::APPENDS => {
                let items = self.pop_mark(at)?;
                let target = self.top(at)?;
                extend_list(&target, items, at)?;
            }
            op::SETITEM => {
                let v = self.pop(at)?;
                let k = self.pop(at)?;
                let target = self.top(at)?;
                set_items(&target, vec![(k, v)], at)?;
            }
            op::SETITEMS => {
                let items = self.pop_mark(at)?;
                let entries = pairs(items, at)?;
                let target = self.top(at)?;
                set_items(&target, entries, at)?;
            }
            op::ADDITEMS => {
                let items = self.pop_mark(at)?;
                let target = self.top(at)?;
                add_items(&target, items, at)?;
            }

            /* ───── memo ───── */
            op::GET => {
                let id = self.line_id(at)?;
                self.get(id, at)?;
            }
            op::BINGET => {
                let id = u32::from(self.r.read_u8()?);
                self.get(id, at)?;
            }
            op::LONG_BINGET => {
                let id = self.r.read_u32_le()?;
                self.get(id, at)?;
            }
            op::PUT => {
                let id = self.line_id(at)?;
                self.put(id, at)?;
            }
            op::BINPUT => {
                let id = u32::from(self.r.read_u8()?);
                self.put(id, at)?;
            }
            op::LONG_BINPUT => {
                let id = self.r.read_u32_le()?;
                self.put(id, at)?;
            }
            op::MEMOIZE => {
                let id = u32::try_from(self.memo.len()).map_err(|_| malformed(at, "memo overflow"))?;
                self.put(id, at)?;
            }

            /* ───── classes and objects ───── */
            op::GLOBAL => {
                let module = self.line_str(at)?.to_owned();
                let name = self.line_str(at)?.to_owned();
                let v = self.allow.resolve(&module, &name)?;
                self.stack.push(v);
            }
            op::STACK_GLOBAL => {
                let name = self.pop(at)?;
                let module = self.pop(at)?;
                let (Some(module), Some(name)) = (module.as_str(), name.as_str()) else {
                    return Err(malformed(at, "STACK_GLOBAL operands must be text"));
                };
                let v = self.allow.resolve(module, name)?;
                self.stack.push(v);
            }
            op::REDUCE => {
                let args = self.pop(at)?;
                let callable = self.pop(at)?;
                let v = instantiate(&callable, tuple_items(&args, at)?, Vec::new(), at)?;
                self.stack.push(v);
            }
            op::NEWOBJ => {
                let args = self.pop(at)?;
                let cls = self.pop(at)?;
                let v = instantiate(&cls, tuple_items(&args, at)?, Vec::new(), at)?;
                self.stack.push(v);
            }
            op::NEWOBJ_EX => {
                let kwargs = self.pop(at)?;
                let args = self.pop(at)?;
                let cls = self.pop(at)?;
                let kwargs = match &kwargs {
                    Value::Dict(d) => d.borrow().clone(),
                    other => return Err(malformed(at, format!("NEWOBJ_EX kwargs must be a dict, got {}", other.type_name()))),
                };
                let v = instantiate(&cls, tuple_items(&args, at)?, kwargs, at)?;
                self.stack.push(v);
            }
            op::INST => {
                let module = self.line_str(at)?.to_owned();
                let name = self.line_str(at)?.to_owned();
                let cls = self.allow.resolve(&module, &name)?;
                let args = self.pop_mark(at)?;
                let v = instantiate(&cls, args, Vec::new(), at)?;
                self.stack.push(v);
            }
            op::OBJ => {
                let mut items = self.pop_mark(at)?.into_iter();
                let cls = items.next().ok_or(DecodeError::StackUnderflow { offset: at })?;
                let v = instantiate(&cls, items.collect(), Vec::new(), at)?;
                self.stack.push(v);
            }
            op::BUILD => {
                let state = self.pop(at)?;
                let target = self.top(at)?;
                build(&target, state, at)?;
            }

            // persistent ids, extension registry, out-of-band buffers
            _ => return Err(DecodeError::UnexpectedOpcode { opcode: code, offset: at }.into()),
        }
        Ok(())
    }

    /* ───── stack helpers ───── */

    fn floor(&self) -> usize { self.marks.last().copied().unwrap_or(0) }

    fn pop(&mut self, at: usize) -> PickleResult<Value> {
        if self.stack.len() <= self.floor() {
            return Err(DecodeError::StackUnderflow { offset: at }.into());
        }
        self.stack.pop().ok_or_else(|| DecodeError::StackUnderflow { offset: at }.into())
    }

    fn pop_n(&mut self, n: usize, at: usize) -> PickleResult<Vec<Value>> {
        if self.stack.len() < self.floor() + n {
            return Err(DecodeError::StackUnderflow { offset: at }.into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn top(&self, at: usize) -> PickleResult<Value> {
        if self.stack.len() <= self.floor() {
            return Err(DecodeError::StackUnderflow { offset: at }.into());
        }
        self.stack.last().cloned().ok_or_else(|| DecodeError::StackUnderflow { offset: at }.into())
    }

    fn pop_mark(&mut self, at: usize) -> PickleResult<Vec<Value>> {
        let m = self.marks.pop().ok_or(DecodeError::MarkNotFound { offset: at })?;
        Ok(self.stack.split_off(m.min(self.stack.len())))
    }

    fn get(&mut self, id: u32, at: usize) -> PickleResult<()> {
        let v = self.memo.get(&id).cloned().ok_or(DecodeError::MemoMiss { id, offset: at })?;
        self.stack.push(v);
        Ok(())
    }

    fn put(&mut self, id: u32, at: usize) -> PickleResult<()> {
        let v = self.top(at)?;
        self.memo.insert(id, v);
        Ok(())
    }

    /* ───── readers ───── */

    fn line_str(&mut self, at: usize) -> PickleResult<&'a str> {
        let line = self.r.read_line()?;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        std::str::from_utf8(line).map_err(|_| DecodeError::InvalidUtf8 { offset: at }.into())
    }

    fn line_id(&mut self, at: usize) -> PickleResult<u32> {
        let s = self.line_str(at)?;
        s.trim().parse::<u32>().map_err(|_| malformed(at, format!("bad memo id {s:?}")))
    }

    fn push_utf8(&mut self, n: usize, at: usize) -> PickleResult<()> {
        let raw = self.r.read_bytes(n)?;
        let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { offset: at })?;
        self.stack.push(Value::str(s));
        Ok(())
    }

    fn push_bytes(&mut self, n: usize) -> PickleResult<()> {
        let raw = self.r.read_bytes(n)?;
        self.stack.push(Value::Bytes(Rc::from(raw)));
        Ok(())
    }
}

/* ───── operand semantics ───── */

fn malformed(offset: usize, reason: impl Into<String>) -> PickleError {
    DecodeError::Malformed { offset, reason: reason.into() }.into()
}

fn instantiate(callable: &Value, args: Vec<Value>, kwargs: Vec<(Value, Value)>, at: usize) -> PickleResult<Value> {
    match callable {
        Value::Class(tag) => {
            let mut obj = Object::new(Rc::clone(tag), args);
            obj.kwargs = kwargs;
            Ok(Value::Object(Rc::new(RefCell::new(obj))))
        }
        Value::Builtin(Builtin::Set | Builtin::FrozenSet) => match args.first() {
            None => Ok(Value::new_set(Vec::new())),
            Some(Value::List(l) | Value::Set(l)) => Ok(set_of(l.borrow().clone())),
            Some(Value::Tuple(t)) => Ok(set_of(t.to_vec())),
            Some(other) => Err(malformed(at, format!("cannot build a set from {}", other.type_name()))),
        },
        Value::Builtin(Builtin::Encode) => {
            let text = args.first().and_then(Value::as_str).ok_or_else(|| malformed(at, "encode expects text"))?;
            let bytes = text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| malformed(at, "text is not latin-1")))
                .collect::<PickleResult<Vec<u8>>>()?;
            Ok(Value::Bytes(Rc::from(bytes)))
        }
        other => Err(malformed(at, format!("{} is not callable", other.type_name()))),
    }
}

fn build(target: &Value, state: Value, at: usize) -> PickleResult<()> {
    let Value::Object(obj) = target else {
        return Err(malformed(at, format!("BUILD on {}", target.type_name())));
    };
    let mut obj = obj.borrow_mut();
    let merge_into = match (&obj.state, &state) {
        (Some(Value::Dict(old)), Value::Dict(new)) if !Rc::ptr_eq(old, new) => Some(Rc::clone(old)),
        _ => None,
    };
    match (merge_into, &state) {
        (Some(old), Value::Dict(new)) => {
            let new = new.borrow().clone();
            let mut old = old.borrow_mut();
            for (k, v) in new {
                dict_insert(&mut old, k, v);
            }
        }
        _ => obj.state = Some(state),
    }
    Ok(())
}

fn extend_list(target: &Value, items: Vec<Value>, at: usize) -> PickleResult<()> {
    match target {
        Value::List(l) => l.borrow_mut().extend(items),
        Value::Object(o) => o.borrow_mut().items.extend(items),
        other => return Err(malformed(at, format!("cannot append to {}", other.type_name()))),
    }
    Ok(())
}

fn set_items(target: &Value, entries: Vec<(Value, Value)>, at: usize) -> PickleResult<()> {
    match target {
        Value::Dict(d) => {
            let mut d = d.borrow_mut();
            for (k, v) in entries {
                dict_insert(&mut d, k, v);
            }
        }
        Value::Object(o) => {
            let mut o = o.borrow_mut();
            for (k, v) in entries {
                dict_insert(&mut o.entries, k, v);
            }
        }
        other => return Err(malformed(at, format!("cannot set items on {}", other.type_name()))),
    }
    Ok(())
}

fn add_items(target: &Value, items: Vec<Value>, at: usize) -> PickleResult<()> {
    match target {
        Value::Set(s) => {
            let mut s = s.borrow_mut();
            for v in items {
                if !s.iter().any(|x| x.key_eq(&v)) {
                    s.push(v);
                }
            }
        }
        Value::Object(o) => o.borrow_mut().items.extend(items),
        other => return Err(malformed(at, format!("cannot add items to {}", other.type_name()))),
    }
    Ok(())
}

fn set_of(items: Vec<Value>) -> Value {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for v in items {
        if !out.iter().any(|x| x.key_eq(&v)) {
            out.push(v);
        }
    }
    Value::new_set(out)
}

fn tuple_items(args: &Value, at: usize) -> PickleResult<Vec<Value>> {
    match args {
        Value::Tuple(t) => Ok(t.to_vec()),
        Value::List(l) => Ok(l.borrow().clone()),
        Value::None => Ok(Vec::new()),
        other => Err(malformed(at, format!("constructor arguments must be a tuple, got {}", other.type_name()))),
    }
}

fn pairs(items: Vec<Value>, at: usize) -> PickleResult<Vec<(Value, Value)>> {
    if items.len() % 2 != 0 {
        return Err(malformed(at, "odd number of items for a mapping"));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((k, v));
    }
    Ok(out)
}

/* ───── literal decoding ───── */

fn parse_int(s: &str, at: usize) -> PickleResult<i64> {
    let s = s.trim();
    s.parse::<i64>().map_err(|_| {
        if !s.is_empty() && s.trim_start_matches(['-', '+']).bytes().all(|b| b.is_ascii_digit()) {
            DecodeError::IntegerOverflow { bytes: s.len(), offset: at }.into()
        } else {
            malformed(at, format!("bad integer literal {s:?}"))
        }
    })
}

/// Little-endian two's complement, at most 8 bytes.
fn decode_long(bytes: &[u8], at: usize) -> PickleResult<i64> {
    let Some(&last) = bytes.last() else { return Ok(0) };
    if bytes.len() > 8 {
        return Err(DecodeError::IntegerOverflow { bytes: bytes.len(), offset: at }.into());
    }
    let mut buf = if last & 0x80 != 0 { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

fn latin1(raw: &[u8]) -> String { raw.iter().map(|&b| char::from(b)).collect() }

fn strip_quotes(line: &[u8]) -> Option<&[u8]> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match (line.first(), line.last()) {
        (Some(&q @ (b'\'' | b'"')), Some(&e)) if line.len() >= 2 && q == e => Some(&line[1..line.len() - 1]),
        _ => None,
    }
}

/// Backslash escapes of a protocol-0 `STRING` literal.
fn unescape_bytes(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'\\' || i + 1 >= body.len() {
            out.push(b);
            i += 1;
            continue;
        }
        let e = body[i + 1];
        i += 2;
        match e {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' | b'\'' | b'"' => out.push(e),
            b'x' => match body.get(i..i + 2).and_then(|h| std::str::from_utf8(h).ok()).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                Some(v) => {
                    out.push(v);
                    i += 2;
                }
                None => out.extend_from_slice(b"\\x"),
            },
            b'0'..=b'7' => {
                let mut v = u32::from(e - b'0');
                let mut taken = 0;
                while taken < 2 && i < body.len() && (b'0'..=b'7').contains(&body[i]) {
                    v = v * 8 + u32::from(body[i] - b'0');
                    i += 1;
                    taken += 1;
                }
                out.push((v & 0xff) as u8);
            }
            _ => {
                out.push(b'\\');
                out.push(e);
            }
        }
    }
    out
}

/// `raw-unicode-escape`: only `\uXXXX` and `\UXXXXXXXX` are escapes, every
/// other byte is a latin-1 code point.
fn raw_unicode_escape(line: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        let width = match (b, line.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            _ => 0,
        };
        if width == 0 {
            out.push(char::from(b));
            i += 1;
            continue;
        }
        let hex = line.get(i + 2..i + 2 + width)?;
        let code = u32::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?;
        out.push(char::from_u32(code)?);
        i += 2 + width;
    }
    Some(out)
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pickle::{PickleWriter, SecurityError};

    fn script(data: &[u8]) -> PickleResult<Value> { loads(data, &AllowList::script()) }

    #[test]
    fn scalars() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.none().bool(true).int(7).int(-3).int(70_000).int(1 << 40).float(1.5).str("héllo").bytes(b"\x00\x01");
        });
        let v = script(&w.finish())?;
        let Value::Tuple(items) = v else { panic!("expected tuple") };
        assert_eq!(items.len(), 9);
        assert!(items[0].is_none());
        assert_eq!(items[1].as_int(), Some(1));
        assert_eq!(items[2].as_int(), Some(7));
        assert_eq!(items[3].as_int(), Some(-3));
        assert_eq!(items[4].as_int(), Some(70_000));
        assert_eq!(items[5].as_int(), Some(1 << 40));
        assert!(matches!(items[6], Value::Float(x) if (x - 1.5).abs() < f64::EPSILON));
        assert_eq!(items[7].as_str(), Some("héllo"));
        assert!(matches!(&items[8], Value::Bytes(b) if &b[..] == b"\x00\x01"));
        Ok(())
    }

    #[test]
    fn protocol0_text_opcodes() -> PickleResult<()> {
        let data = b"(I01\nI00\nI42\nL-5L\nF2.25\nS'a\\nb'\nVx\\u00e9y\np0\ng0\nt.";
        let Value::Tuple(items) = script(data)? else { panic!("expected tuple") };
        assert!(matches!(items[0], Value::Bool(true)));
        assert!(matches!(items[1], Value::Bool(false)));
        assert_eq!(items[2].as_int(), Some(42));
        assert_eq!(items[3].as_int(), Some(-5));
        assert_eq!(items[5].as_str(), Some("a\nb"));
        assert_eq!(items[6].as_str(), Some("xéy"));
        assert!(items[6].ptr_eq(&items[7]));
        Ok(())
    }

    #[test]
    fn memo_get_returns_the_same_aggregate() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.list(|w| {
            w.int(1);
        })
        .put(0)
        .pop()
        .tuple(|w| {
            w.get(0).get(0);
        });
        let Value::Tuple(items) = script(&w.finish())? else { panic!("expected tuple") };
        assert!(items[0].ptr_eq(&items[1]));
        Ok(())
    }

    #[test]
    fn objects_record_args_and_state() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.object("renpy.ast", "Say", |w| {
            w.str("what").str("Hello").str("who").none();
        });
        let v = script(&w.finish())?;
        let obj = match &v {
            Value::Object(o) => o.borrow().clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(obj.class.qualified(), "renpy.ast.Say");
        let state = obj.state.unwrap_or(Value::None);
        assert_eq!(state.dict_get("what").and_then(|v| v.as_str().map(str::to_owned)), Some("Hello".to_owned()));
        Ok(())
    }

    #[test]
    fn build_merges_dict_state() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.object("renpy.ast", "Pass", |w| {
            w.str("a").int(1);
        })
        .dict(|w| {
            w.str("b").int(2);
        })
        .build();
        let v = script(&w.finish())?;
        let Value::Object(o) = v else { panic!("expected object") };
        let state = o.borrow().state.clone().unwrap_or(Value::None);
        assert_eq!(state.dict_get("a").and_then(|v| v.as_int()), Some(1));
        assert_eq!(state.dict_get("b").and_then(|v| v.as_int()), Some(2));
        Ok(())
    }

    #[test]
    fn disallowed_module_is_a_security_error() {
        let mut w = PickleWriter::new();
        w.global("os", "system").str("echo").tuple1().reduce();
        assert_eq!(
            script(&w.finish()).err(),
            Some(PickleError::Security(SecurityError::DisallowedClass { module: "os".into(), name: "system".into() }))
        );
    }

    #[test]
    fn stack_global_is_checked_too() {
        let data = b"\x80\x04\x8c\x02os\x8c\x06system\x93.";
        assert!(matches!(script(data), Err(PickleError::Security(_))));
    }

    #[test]
    fn memo_miss_and_unknown_opcode() {
        let mut w = PickleWriter::new();
        w.get(3);
        assert!(matches!(script(&w.finish()), Err(PickleError::Decode(DecodeError::MemoMiss { id: 3, .. }))));

        assert_eq!(
            script(b"\x80\x02\xff.").err(),
            Some(PickleError::Decode(DecodeError::UnexpectedOpcode { opcode: 0xff, offset: 2 }))
        );
        assert!(matches!(
            script(b"P1\n."),
            Err(PickleError::Decode(DecodeError::UnexpectedOpcode { opcode: op::PERSID, .. }))
        ));
    }

    #[test]
    fn truncated_stream_is_eof() {
        assert!(matches!(script(b"\x80\x02K"), Err(PickleError::Decode(DecodeError::UnexpectedEof { .. }))));
        assert!(matches!(script(b"\x80\x02N"), Err(PickleError::Decode(DecodeError::UnexpectedEof { .. }))));
    }

    #[test]
    fn underflow_and_missing_mark() {
        assert!(matches!(script(b"\x80\x02."), Err(PickleError::Decode(DecodeError::StackUnderflow { .. }))));
        assert!(matches!(script(b"\x80\x02Nl."), Err(PickleError::Decode(DecodeError::MarkNotFound { .. }))));
        // pops never cross the newest mark
        assert!(matches!(script(b"\x80\x02N(a."), Err(PickleError::Decode(DecodeError::StackUnderflow { .. }))));
    }

    #[test]
    fn wide_longs_overflow() {
        let mut data = b"\x80\x02\x8a\x09".to_vec();
        data.extend_from_slice(&[0u8; 9]);
        data.push(op::STOP);
        assert!(matches!(script(&data), Err(PickleError::Decode(DecodeError::IntegerOverflow { bytes: 9, .. }))));
        assert_eq!(decode_long(&[0xff], 0).ok(), Some(-1));
        assert_eq!(decode_long(&[0x00, 0x80], 0).ok(), Some(-32768));
    }

    #[test]
    fn sets_and_frozensets() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.global("__builtin__", "set")
            .list(|w| {
                w.int(1).int(1).int(2);
            })
            .tuple1()
            .reduce();
        let v = script(&w.finish())?;
        let Value::Set(s) = v else { panic!("expected set") };
        assert_eq!(s.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn codecs_encode_gives_latin1_bytes() -> PickleResult<()> {
        let mut w = PickleWriter::new();
        w.global("_codecs", "encode")
            .tuple(|w| {
                w.str("\u{e9}a").str("latin1");
            })
            .reduce();
        let v = loads(&w.finish(), &AllowList::archive_index())?;
        assert!(matches!(&v, Value::Bytes(b) if &b[..] == [0xe9, b'a']));
        Ok(())
    }
}
