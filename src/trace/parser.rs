use std::str::FromStr;

use thiserror::Error;

use crate::infer::Type;

/// A type written in a trace: a primitive name or the name of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Primitive(Type),
    Object(String),
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        match Type::from_str(name) {
            Ok(ty) => TypeRef::Primitive(ty),
            Err(()) => TypeRef::Object(name.to_string()),
        }
    }
}

/// A runtime value written in a trace
#[derive(Debug, Clone, PartialEq)]
pub enum ValueLit {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(String),
    Magic,
    Object(String),
}

impl From<&str> for ValueLit {
    fn from(token: &str) -> Self {
        match token {
            "undefined" => return ValueLit::Undefined,
            "null" => return ValueLit::Null,
            "true" => return ValueLit::Boolean(true),
            "false" => return ValueLit::Boolean(false),
            "magic" => return ValueLit::Magic,
            _ => {},
        }

        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return ValueLit::String(token[1..token.len()-1].to_string());
        }

        if let Ok(value) = token.parse::<i32>() {
            return ValueLit::Int32(value);
        }

        let starts_numeric = token.starts_with(|ch: char| ch.is_ascii_digit() || ch == '-');
        match token.parse::<f64>() {
            Ok(value) if starts_numeric => ValueLit::Double(value),
            _ => ValueLit::Object(token.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set {name: String},
    Object {name: String, proto: Option<String>},
    Array {name: String},
    Function {name: String, script: Option<u32>, nargs: usize},
    Native {name: String, generic: bool},

    Add {set: String, ty: TypeRef},
    Subset {source: String, target: String},
    GetProp {objects: String, prop: String, target: String},
    SetProp {objects: String, prop: String, source: String},
    GetElem {objects: String, indexes: String, target: String},
    SetElem {objects: String, indexes: String, source: String},
    Arith {lhs: String, rhs: Option<String>, target: String, numeric: bool},
    Filter {source: String, target: String, null_void: bool},
    Call {is_new: bool, callee: String, args: Vec<String>, target: Option<String>},
    Prop {object: String, prop: String, set: String, own: bool},

    Assign {object: String, prop: String, value: ValueLit},
    Push {script: u32, offset: u32, index: u32, ty: TypeRef},
    Unknown {object: String},
    NotPacked {object: String, dense: bool},

    Tag {set: String, script: Option<u32>},
    Kind {set: String, script: Option<u32>},
    NonEmpty {set: String, script: Option<u32>},
    Print {set: String},
    Recompile,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("wrong number of arguments for `{command}` (usage: {usage})")]
    Usage {command: &'static str, usage: &'static str},
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("invalid bytecode location `{0}` (expected SCRIPT:OFFSET)")]
    InvalidLocation(String),
}

/// Parses a single line of a trace. Blank lines and comments (`//`) produce `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let line = match line.find("//") {
        Some(start) => &line[..start],
        None => line,
    };

    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }
    let command = tokens.remove(0);

    macro_rules! usage {
        ($command:literal, $usage:literal) => {
            return Err(ParseError::Usage {command: $command, usage: $usage})
        };
    }

    let command = match (command, &tokens[..]) {
        ("set", &[name]) => Command::Set {name: name.to_string()},
        ("set", _) => usage!("set", "set NAME"),

        ("object", &[name]) => Command::Object {name: name.to_string(), proto: None},
        ("object", &[name, "proto", proto]) => Command::Object {name: name.to_string(), proto: Some(proto.to_string())},
        ("object", _) => usage!("object", "object NAME [proto OBJ]"),

        ("array", &[name]) => Command::Array {name: name.to_string()},
        ("array", _) => usage!("array", "array NAME"),

        ("function", &[name, ref rest @ ..]) => {
            let mut script = None;
            let mut nargs = 0;
            let mut rest = rest.iter();
            while let Some(&key) = rest.next() {
                match (key, rest.next()) {
                    ("script", Some(value)) => script = Some(parse_number(value)?),
                    ("nargs", Some(value)) => nargs = parse_number::<usize>(value)?,
                    _ => usage!("function", "function NAME [script N] [nargs N]"),
                }
            }
            Command::Function {name: name.to_string(), script, nargs}
        },
        ("function", _) => usage!("function", "function NAME [script N] [nargs N]"),

        ("native", &[name]) => Command::Native {name: name.to_string(), generic: false},
        ("native", &[name, "generic"]) => Command::Native {name: name.to_string(), generic: true},
        ("native", _) => usage!("native", "native NAME [generic]"),

        ("add", &[set, ty]) => Command::Add {set: set.to_string(), ty: ty.into()},
        ("add", _) => usage!("add", "add SET TYPE"),

        ("subset", &[source, target]) => Command::Subset {source: source.to_string(), target: target.to_string()},
        ("subset", _) => usage!("subset", "subset SRC DST"),

        ("getprop", &[objects, prop, target]) => Command::GetProp {
            objects: objects.to_string(),
            prop: prop.to_string(),
            target: target.to_string(),
        },
        ("getprop", _) => usage!("getprop", "getprop OBJSET PROP DST"),

        ("setprop", &[objects, prop, source]) => Command::SetProp {
            objects: objects.to_string(),
            prop: prop.to_string(),
            source: source.to_string(),
        },
        ("setprop", _) => usage!("setprop", "setprop OBJSET PROP SRC"),

        ("getelem", &[objects, indexes, target]) => Command::GetElem {
            objects: objects.to_string(),
            indexes: indexes.to_string(),
            target: target.to_string(),
        },
        ("getelem", _) => usage!("getelem", "getelem OBJSET IDXSET DST"),

        ("setelem", &[objects, indexes, source]) => Command::SetElem {
            objects: objects.to_string(),
            indexes: indexes.to_string(),
            source: source.to_string(),
        },
        ("setelem", _) => usage!("setelem", "setelem OBJSET IDXSET SRC"),

        ("arith", args) => {
            let (args, numeric) = match args {
                [rest @ .., "numeric"] => (rest, true),
                _ => (args, false),
            };
            match args {
                &[lhs, target] => Command::Arith {lhs: lhs.to_string(), rhs: None, target: target.to_string(), numeric},
                &[lhs, rhs, target] => Command::Arith {
                    lhs: lhs.to_string(),
                    rhs: Some(rhs.to_string()),
                    target: target.to_string(),
                    numeric,
                },
                _ => usage!("arith", "arith LHS [RHS] DST [numeric]"),
            }
        },

        ("filter", &[source, target]) => Command::Filter {source: source.to_string(), target: target.to_string(), null_void: false},
        ("filter", &[source, target, "nullvoid"]) => Command::Filter {source: source.to_string(), target: target.to_string(), null_void: true},
        ("filter", _) => usage!("filter", "filter SRC DST [nullvoid]"),

        ("call", args) | ("new", args) => {
            let is_new = command == "new";
            let (args, target) = match args {
                [rest @ .., "->", target] => (rest, Some(target.to_string())),
                _ => (args, None),
            };
            match args {
                [callee, args @ ..] if !args.contains(&"->") => Command::Call {
                    is_new,
                    callee: callee.to_string(),
                    args: args.iter().map(|arg| arg.to_string()).collect(),
                    target,
                },
                _ if is_new => usage!("new", "new CALLEE [ARGS...] [-> DST]"),
                _ => usage!("call", "call CALLEE [ARGS...] [-> DST]"),
            }
        },

        ("prop", &[object, prop, set]) => Command::Prop {object: object.to_string(), prop: prop.to_string(), set: set.to_string(), own: false},
        ("prop", &[object, prop, set, "own"]) => Command::Prop {object: object.to_string(), prop: prop.to_string(), set: set.to_string(), own: true},
        ("prop", _) => usage!("prop", "prop OBJ PROP SET [own]"),

        ("assign", &[object, prop, value]) => Command::Assign {object: object.to_string(), prop: prop.to_string(), value: value.into()},
        ("assign", _) => usage!("assign", "assign OBJ PROP VALUE"),

        ("push", &[location, index, ty]) => {
            let (script, offset) = parse_location(location)?;
            Command::Push {script, offset, index: parse_number(index)?, ty: ty.into()}
        },
        ("push", _) => usage!("push", "push SCRIPT:OFFSET INDEX TYPE"),

        ("unknown", &[object]) => Command::Unknown {object: object.to_string()},
        ("unknown", _) => usage!("unknown", "unknown OBJ"),

        ("notpacked", &[object]) => Command::NotPacked {object: object.to_string(), dense: false},
        ("notpacked", &[object, "dense"]) => Command::NotPacked {object: object.to_string(), dense: true},
        ("notpacked", _) => usage!("notpacked", "notpacked OBJ [dense]"),

        ("tag", &[set]) => Command::Tag {set: set.to_string(), script: None},
        ("tag", &[set, script]) => Command::Tag {set: set.to_string(), script: Some(parse_script(script)?)},
        ("tag", _) => usage!("tag", "tag SET [SCRIPT]"),

        ("kind", &[set]) => Command::Kind {set: set.to_string(), script: None},
        ("kind", &[set, script]) => Command::Kind {set: set.to_string(), script: Some(parse_script(script)?)},
        ("kind", _) => usage!("kind", "kind SET [SCRIPT]"),

        ("nonempty", &[set]) => Command::NonEmpty {set: set.to_string(), script: None},
        ("nonempty", &[set, script]) => Command::NonEmpty {set: set.to_string(), script: Some(parse_script(script)?)},
        ("nonempty", _) => usage!("nonempty", "nonempty SET [SCRIPT]"),

        ("print", &[set]) => Command::Print {set: set.to_string()},
        ("print", _) => usage!("print", "print SET"),

        ("recompile", &[]) => Command::Recompile,
        ("recompile", _) => usage!("recompile", "recompile"),

        (command, _) => return Err(ParseError::UnknownCommand(command.to_string())),
    };

    Ok(Some(command))
}

fn parse_number<T: FromStr>(token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber(token.to_string()))
}

/// Scripts may be written as `3` or `#3`
fn parse_script(token: &str) -> Result<u32, ParseError> {
    parse_number(token.strip_prefix('#').unwrap_or(token))
}

fn parse_location(token: &str) -> Result<(u32, u32), ParseError> {
    let mut parts = token.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(script), Some(offset)) => Ok((parse_script(script)?, parse_number(offset)?)),
        _ => Err(ParseError::InvalidLocation(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_and_comments() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   // nothing here"), Ok(None));
        assert_eq!(parse_line("set a // trailing"), Ok(Some(Command::Set {name: "a".to_string()})));
    }

    #[test]
    fn arith_operands() {
        assert_eq!(parse_line("arith a b c numeric"), Ok(Some(Command::Arith {
            lhs: "a".to_string(),
            rhs: Some("b".to_string()),
            target: "c".to_string(),
            numeric: true,
        })));
        assert_eq!(parse_line("arith a c"), Ok(Some(Command::Arith {
            lhs: "a".to_string(),
            rhs: None,
            target: "c".to_string(),
            numeric: false,
        })));
    }

    #[test]
    fn calls() {
        assert_eq!(parse_line("new f x y -> r"), Ok(Some(Command::Call {
            is_new: true,
            callee: "f".to_string(),
            args: vec!["x".to_string(), "y".to_string()],
            target: Some("r".to_string()),
        })));
        assert_eq!(parse_line("call f"), Ok(Some(Command::Call {
            is_new: false,
            callee: "f".to_string(),
            args: vec![],
            target: None,
        })));
        assert!(parse_line("call f -> ").is_err());
    }

    #[test]
    fn values_and_types() {
        assert_eq!(ValueLit::from("12"), ValueLit::Int32(12));
        assert_eq!(ValueLit::from("1.5"), ValueLit::Double(1.5));
        assert_eq!(ValueLit::from("\"hi\""), ValueLit::String("hi".to_string()));
        assert_eq!(ValueLit::from("inf"), ValueLit::Object("inf".to_string()));
        assert_eq!(TypeRef::from("int32"), TypeRef::Primitive(Type::Int32));
        assert_eq!(TypeRef::from("point"), TypeRef::Object("point".to_string()));
    }

    #[test]
    fn push_locations() {
        assert_eq!(parse_line("push #2:10 0 double"), Ok(Some(Command::Push {
            script: 2,
            offset: 10,
            index: 0,
            ty: TypeRef::Primitive(Type::Double),
        })));
        assert_eq!(parse_line("push 2 0 double"), Err(ParseError::InvalidLocation("2".to_string())));
    }

    #[test]
    fn errors() {
        assert_eq!(parse_line("frobnicate x"), Err(ParseError::UnknownCommand("frobnicate".to_string())));
        assert_eq!(parse_line("set"), Err(ParseError::Usage {command: "set", usage: "set NAME"}));
        assert_eq!(parse_line("function f nargs x"), Err(ParseError::InvalidNumber("x".to_string())));
    }
}
