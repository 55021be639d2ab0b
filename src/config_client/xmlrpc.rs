// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bit-exact config-service framing (spec §6): a request is
//! `<Interface><Method><call>…</call></Method></Interface>`, a response is
//! `<Interface><Method><return>…</return></Method></Interface>`. Every
//! call we make only ever sends string and struct parameters, and every
//! reply we care about is a struct, an array of structs, or a plain
//! scalar; this codec covers the subset the spec's operations actually use
//! rather than a general-purpose value grammar.

use quick_xml::{
    Reader, Writer,
    events::{BytesStart, BytesText, Event},
};

use crate::error::{Error, Result};

/// A decoded XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Struct(Vec<(String, Value)>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.as_struct()?.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Serializes a `<call>` frame: `<Interface><Method><call>{params}</call>
/// </Method></Interface>` (spec §6). Each param is wrapped in its own
/// `<value>` element, written back to back with no enclosing `<params>`
/// wrapper — the bit-exact framing has no XML-RPC `<params>`/`<param>`
/// nesting.
pub fn encode_call(interface: &str, method: &str, params: &[Value]) -> Vec<u8> {
    let mut w = Writer::new(Vec::new());
    write_start(&mut w, interface);
    write_start(&mut w, method);
    write_start(&mut w, "call");
    for p in params {
        write_value(&mut w, p);
    }
    write_end(&mut w, "call");
    write_end(&mut w, method);
    write_end(&mut w, interface);
    w.into_inner()
}

/// Serializes a `<return>` frame, the mirror of [`encode_call`]. Used by
/// the in-process simulator that drives integration tests; a real
/// controller is the one producing these frames in practice.
pub fn encode_return(interface: &str, method: &str, value: Option<&Value>) -> Vec<u8> {
    let mut w = Writer::new(Vec::new());
    write_start(&mut w, interface);
    write_start(&mut w, method);
    write_start(&mut w, "return");
    if let Some(v) = value {
        write_value(&mut w, v);
    }
    write_end(&mut w, "return");
    write_end(&mut w, method);
    write_end(&mut w, interface);
    w.into_inner()
}

fn write_start(w: &mut Writer<Vec<u8>>, name: &str) {
    w.write_event(Event::Start(BytesStart::new(name))).expect("writing to an in-memory buffer cannot fail");
}

fn write_end(w: &mut Writer<Vec<u8>>, name: &str) {
    w.write_event(Event::End(quick_xml::events::BytesEnd::new(name)))
        .expect("writing to an in-memory buffer cannot fail");
}

fn write_text(w: &mut Writer<Vec<u8>>, tag: &str, text: &str) {
    write_start(w, tag);
    w.write_event(Event::Text(BytesText::new(text))).expect("writing to an in-memory buffer cannot fail");
    write_end(w, tag);
}

fn write_value(w: &mut Writer<Vec<u8>>, value: &Value) {
    write_start(w, "value");
    match value {
        Value::String(s) => write_text(w, "string", s),
        Value::Int(i) => write_text(w, "int", &i.to_string()),
        Value::Bool(b) => write_text(w, "boolean", if *b { "1" } else { "0" }),
        Value::Double(d) => write_text(w, "double", &d.to_string()),
        Value::Nil => {
            write_start(w, "nil");
            write_end(w, "nil");
        },
        Value::Struct(members) => {
            write_start(w, "struct");
            for (name, v) in members {
                write_start(w, "member");
                write_text(w, "name", name);
                write_value(w, v);
                write_end(w, "member");
            }
            write_end(w, "struct");
        },
        Value::Array(items) => {
            write_start(w, "array");
            write_start(w, "data");
            for v in items {
                write_value(w, v);
            }
            write_end(w, "data");
            write_end(w, "array");
        },
    }
    write_end(w, "value");
}

/// Parses a `<return>` frame into its single value, validating that the
/// response's outer `<Interface><Method>` tags match the request that was
/// just sent — the framing rule's "closing tag equals the request's"
/// correlation check (spec §4.B), implemented here as an exact-match
/// assertion rather than a frame-selection scan, since the config channel
/// never has more than one request outstanding at a time. A mismatch
/// (wrong interface or method name) decodes as an error rather than
/// silently accepting a desynced reply.
pub fn decode_return(frame: &[u8], interface: &str, method: &str) -> Result<Value> {
    let mut reader = Reader::from_reader(frame);
    reader.config_mut().trim_text(true);

    expect_start_named(&mut reader, interface)?;
    expect_start_named(&mut reader, method)?;
    expect_start_named(&mut reader, "return")?;

    // An empty `<return></return>` means "no value" (e.g. void calls);
    // anything else holds exactly one `<value>`.
    let value = match reader.read_event().map_err(xml_err)? {
        Event::End(e) if e.name().as_ref() == b"return" => Value::Nil,
        Event::Start(e) if e.name().as_ref() == b"value" => {
            let v = parse_value_body(&mut reader)?;
            expect_end_named(&mut reader, "return")?;
            v
        },
        other => return Err(Error::decode(format!("unexpected event inside <return>: {other:?}"))),
    };

    expect_end_named(&mut reader, method)?;
    expect_end_named(&mut reader, interface)?;
    Ok(value)
}

/// Decodes a `<call>` frame into `(interface, method, params)`, used by the
/// in-process simulator that drives integration tests — unlike
/// [`decode_return`], the simulator doesn't know the interface/method
/// ahead of time, so it scans for them instead of asserting an exact
/// match.
pub fn decode_call(frame: &[u8]) -> Result<(String, String, Vec<Value>)> {
    let mut reader = Reader::from_reader(frame);
    reader.config_mut().trim_text(true);

    let interface = next_significant_start(&mut reader)?;
    let method = next_significant_start(&mut reader)?;
    expect_start_named(&mut reader, "call")?;

    let mut params = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.name().as_ref() == b"value" => {
                params.push(parse_value_body(&mut reader)?);
            },
            Event::End(e) if e.name().as_ref() == b"call" => break,
            Event::Eof => return Err(Error::decode("unexpected EOF in call params")),
            _ => {},
        }
    }
    expect_end_named(&mut reader, &method)?;
    expect_end_named(&mut reader, &interface)?;
    Ok((interface, method, params))
}

fn parse_value(reader: &mut Reader<&[u8]>) -> Result<Value> {
    expect_start_named(reader, "value")?;
    let value = match reader.read_event().map_err(xml_err)? {
        Event::Start(e) => {
            let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            let v = parse_typed_value(reader, &tag)?;
            expect_end_named(reader, &tag)?;
            v
        },
        Event::Text(t) => Value::String(t.unescape().map_err(xml_err)?.into_owned()),
        Event::End(e) if e.name().as_ref() == b"value" => return Ok(Value::String(String::new())),
        other => return Err(Error::decode(format!("unexpected event inside <value>: {other:?}"))),
    };
    expect_end_named(reader, "value")?;
    Ok(value)
}

fn parse_typed_value(reader: &mut Reader<&[u8]>, tag: &str) -> Result<Value> {
    match tag {
        "string" => Ok(Value::String(read_text_rest(reader)?)),
        "int" | "i4" | "i8" => {
            let text = read_text_rest(reader)?;
            text.trim().parse::<i64>().map(Value::Int).map_err(|_| Error::decode(format!("invalid int '{text}'")))
        },
        "boolean" => Ok(Value::Bool(read_text_rest(reader)?.trim() == "1")),
        "double" => {
            let text = read_text_rest(reader)?;
            text.trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| Error::decode(format!("invalid double '{text}'")))
        },
        "nil" => Ok(Value::Nil),
        "struct" => {
            let mut members = Vec::new();
            loop {
                match reader.read_event().map_err(xml_err)? {
                    Event::Start(e) if e.name().as_ref() == b"member" => {
                        let name = read_text_element(reader, "name")?;
                        let value = parse_value(reader)?;
                        expect_end_named(reader, "member")?;
                        members.push((name, value));
                    },
                    Event::End(e) if e.name().as_ref() == b"struct" => break,
                    Event::Eof => return Err(Error::decode("unexpected EOF in <struct>")),
                    _ => {},
                }
            }
            Ok(Value::Struct(members))
        },
        "array" => {
            expect_start_named(reader, "data")?;
            let mut items = Vec::new();
            loop {
                match reader.read_event().map_err(xml_err)? {
                    Event::Start(e) if e.name().as_ref() == b"value" => {
                        items.push(parse_value_body(reader)?);
                    },
                    Event::End(e) if e.name().as_ref() == b"data" => break,
                    Event::Eof => return Err(Error::decode("unexpected EOF in <array>/<data>")),
                    _ => {},
                }
            }
            Ok(Value::Array(items))
        },
        other => Err(Error::decode(format!("unsupported XML-RPC value type <{other}>"))),
    }
}

/// Parses the inside of a `<value>` element whose opening tag has already
/// been consumed (used when the caller just matched `Event::Start` for
/// `value` itself, e.g. inside `<array><data>`).
fn parse_value_body(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let value = match reader.read_event().map_err(xml_err)? {
        Event::Start(e) => {
            let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            let v = parse_typed_value(reader, &tag)?;
            expect_end_named(reader, &tag)?;
            v
        },
        Event::Text(t) => Value::String(t.unescape().map_err(xml_err)?.into_owned()),
        Event::End(e) if e.name().as_ref() == b"value" => return Ok(Value::String(String::new())),
        other => return Err(Error::decode(format!("unexpected event inside <value>: {other:?}"))),
    };
    expect_end_named(reader, "value")?;
    Ok(value)
}

fn read_text_rest(reader: &mut Reader<&[u8]>) -> Result<String> {
    match reader.read_event().map_err(xml_err)? {
        Event::Text(t) => Ok(t.unescape().map_err(xml_err)?.into_owned()),
        Event::End(_) => Ok(String::new()),
        other => Err(Error::decode(format!("expected text, found {other:?}"))),
    }
}

fn read_text_element(reader: &mut Reader<&[u8]>, tag: &str) -> Result<String> {
    expect_start_named(reader, tag)?;
    let text = read_text_rest(reader)?;
    expect_end_named(reader, tag)?;
    Ok(text)
}

fn expect_start_named(reader: &mut Reader<&[u8]>, tag: &str) -> Result<()> {
    match reader.read_event().map_err(xml_err)? {
        Event::Start(e) if e.name().as_ref() == tag.as_bytes() => Ok(()),
        other => Err(Error::decode(format!("expected <{tag}>, found {other:?}"))),
    }
}

fn expect_end_named(reader: &mut Reader<&[u8]>, tag: &str) -> Result<()> {
    match reader.read_event().map_err(xml_err)? {
        Event::End(e) if e.name().as_ref() == tag.as_bytes() => Ok(()),
        other => Err(Error::decode(format!("expected </{tag}>, found {other:?}"))),
    }
}

/// Scans forward past whitespace/comments to find the next start tag name
/// at the current nesting level (used by [`decode_call`] to read the
/// `<Interface>`/`<Method>` tag names, which aren't known ahead of time).
fn next_significant_start(reader: &mut Reader<&[u8]>) -> Result<String> {
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
            Event::Text(_) | Event::Comment(_) => continue,
            Event::Eof => return Err(Error::decode("expected element, found EOF")),
            other => return Err(Error::decode(format!("unexpected event {other:?}"))),
        }
    }
}

fn xml_err(e: quick_xml::Error) -> Error {
    Error::decode(format!("XML-RPC parse error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_bit_exact_call_frame() {
        let call = encode_call("ILogin", "Login", &[Value::String("admin".into()), Value::String("hunter2".into())]);
        let text = String::from_utf8(call).unwrap();
        assert_eq!(
            text,
            "<ILogin><Login><call><value><string>admin</string></value>\
             <value><string>hunter2</string></value></call></Login></ILogin>"
        );
    }

    #[test]
    fn decodes_scalar_return() {
        let frame = b"<IIntrospection><GetVersion><return><value><string>ok</string></value></return></GetVersion></IIntrospection>";
        let v = decode_return(frame, "IIntrospection", "GetVersion").unwrap();
        assert_eq!(v, Value::String("ok".into()));
    }

    #[test]
    fn decodes_struct_return() {
        let frame = br#"<IConfiguration><GetObject><return><value><struct>
            <member><name>VID</name><value><int>42</int></value></member>
            <member><name>Name</name><value><string>Kitchen Load</string></value></member>
        </struct></value></return></GetObject></IConfiguration>"#;
        let v = decode_return(frame, "IConfiguration", "GetObject").unwrap();
        assert_eq!(v.member("VID").and_then(Value::as_int), Some(42));
        assert_eq!(v.member("Name").and_then(Value::as_str), Some("Kitchen Load"));
    }

    #[test]
    fn decodes_empty_return_as_nil() {
        let frame = b"<ILogin><Login><return></return></Login></ILogin>";
        let v = decode_return(frame, "ILogin", "Login").unwrap();
        assert_eq!(v, Value::Nil);
    }

    #[test]
    fn decodes_boolean_login_return() {
        let frame = b"<ILogin><Login><return><value><boolean>1</boolean></value></return></Login></ILogin>";
        let v = decode_return(frame, "ILogin", "Login").unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn rejects_a_response_whose_tags_do_not_match_the_request() {
        let frame = b"<IConfiguration><GetObject><return><value><int>1</int></value></return></GetObject></IConfiguration>";
        let err = decode_return(frame, "IIntrospection", "GetVersion").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn round_trips_call_frame() {
        let call = encode_call("IEnclosure", "GetFilterResults", &[Value::Array(vec![Value::Int(1), Value::Int(2)])]);
        let (interface, method, params) = decode_call(&call).unwrap();
        assert_eq!(interface, "IEnclosure");
        assert_eq!(method, "GetFilterResults");
        assert_eq!(params[0].as_array().unwrap().len(), 2);
    }

    #[test]
    fn call_and_return_round_trip_through_each_other() {
        let call = encode_call("IEnclosure", "OpenFilter", &[Value::Int(7)]);
        let (interface, method, params) = decode_call(&call).unwrap();
        assert_eq!(params, vec![Value::Int(7)]);

        let reply = encode_return(&interface, &method, Some(&Value::Int(1)));
        assert_eq!(decode_return(&reply, &interface, &method).unwrap(), Value::Int(1));
    }
}
