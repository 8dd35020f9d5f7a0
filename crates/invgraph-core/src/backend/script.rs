// Script Backend
//
// Renders a traversal request into Gremlin-flavoured text with every value
// moved into a `$pN` binding, then evaluates the text with an embedded engine
// that parses it back into operations and runs the graph interpreter.
//
//   g.V().hasLabel($p0).has('global-customer-id', $p1).as('start')
//    .out('subscribesTo', CONTAINMENT).hasLabel($p2).toList()
//
// The parser only accepts the shape `render` produces.

use super::TraversalBackend;
use crate::graph::{interpreter, InMemoryGraph};
use crate::traversal::{ExecutionMode, RawResult, TraversalOp, TraversalRequest};
use async_trait::async_trait;
use invgraph_common::config::BackendKind;
use invgraph_common::{Direction, NodeType, QueryError, Relationship, StartPredicate};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

pub type Bindings = BTreeMap<String, Value>;

const START_MARKER: &str = "start";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct Renderer {
    out: String,
    bindings: Bindings,
}

impl Renderer {
    fn bind(&mut self, value: &Value) -> String {
        let name = format!("p{}", self.bindings.len());
        self.bindings.insert(name.clone(), value.clone());
        format!("${}", name)
    }

    fn ops(&mut self, ops: &[TraversalOp]) {
        for op in ops {
            match op {
                TraversalOp::HasProperty { key, value } => {
                    let p = self.bind(value);
                    let _ = write!(self.out, ".has({}, {})", quote(key), p);
                }
                TraversalOp::HasType { node_type } => {
                    let p = self.bind(&Value::String(node_type.to_string()));
                    let _ = write!(self.out, ".hasLabel({})", p);
                }
                TraversalOp::Traverse { label, direction, relationship } => {
                    let _ = write!(
                        self.out,
                        ".{}({}, {})",
                        direction.as_str(),
                        quote(label),
                        relationship_ident(*relationship)
                    );
                }
                TraversalOp::Branch { branches } => {
                    self.out.push_str(".union(");
                    for (i, branch) in branches.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.out.push_str("__");
                        self.ops(branch);
                    }
                    self.out.push(')');
                }
                TraversalOp::GroupCount { key } => {
                    let _ = write!(self.out, ".groupCount({})", quote(key));
                }
            }
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn relationship_ident(relationship: Relationship) -> &'static str {
    match relationship {
        Relationship::Containment => "CONTAINMENT",
        Relationship::Peer => "PEER",
    }
}

fn terminal(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Vertices => "toList",
        ExecutionMode::Tree => "tree",
        ExecutionMode::Groups => "next",
    }
}

/// Render `request` to script text plus its parameter bindings.
pub fn render(request: &TraversalRequest) -> (String, Bindings) {
    let mut r = Renderer {
        out: String::from("g.V()"),
        bindings: Bindings::new(),
    };

    if let Some(node_type) = &request.start.node_type {
        let p = r.bind(&Value::String(node_type.to_string()));
        let _ = write!(r.out, ".hasLabel({})", p);
    }
    for (key, value) in &request.start.properties {
        let p = r.bind(value);
        let _ = write!(r.out, ".has({}, {})", quote(key), p);
    }
    let _ = write!(r.out, ".as({})", quote(START_MARKER));

    r.ops(&request.operations);
    let _ = write!(r.out, ".{}()", terminal(request.mode));

    (r.out, r.bindings)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Param(String),
    Dot,
    LParen,
    RParen,
    Comma,
}

fn rejected(msg: impl Into<String>) -> QueryError {
    QueryError::CompiledQueryRejected(msg.into())
}

fn tokenize(script: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = script.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '.' => tokens.push(Token::Dot),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '\'' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => s.push(escaped),
                            None => return Err(rejected(format!("unterminated escape at {}", pos))),
                        },
                        Some((_, '\'')) => break,
                        Some((_, ch)) => s.push(ch),
                        None => return Err(rejected(format!("unterminated string at {}", pos))),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '$' => {
                let name = take_word(&mut chars);
                if name.is_empty() {
                    return Err(rejected(format!("empty parameter name at {}", pos)));
                }
                tokens.push(Token::Param(name));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                word.push_str(&take_word(&mut chars));
                tokens.push(Token::Ident(word));
            }
            other => return Err(rejected(format!("unexpected character '{}' at {}", other, pos))),
        }
    }
    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut word = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Arg {
    Str(String),
    Param(String),
    Ident(String),
    Anon(Vec<Call>),
}

#[derive(Debug, Clone)]
struct Call {
    name: String,
    args: Vec<Arg>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    bindings: &'a Bindings,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), QueryError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            other => Err(rejected(format!("expected {:?}, found {:?}", want, other))),
        }
    }

    fn ident(&mut self) -> Result<String, QueryError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(rejected(format!("expected identifier, found {:?}", other))),
        }
    }

    /// `('.' call)*`
    fn chain(&mut self) -> Result<Vec<Call>, QueryError> {
        let mut calls = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            calls.push(self.call()?);
        }
        Ok(calls)
    }

    fn call(&mut self) -> Result<Call, QueryError> {
        let name = self.ident()?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.arg()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    other => return Err(rejected(format!("expected ',' or ')', found {:?}", other))),
                }
            }
        } else {
            self.pos += 1;
        }
        Ok(Call { name, args })
    }

    fn arg(&mut self) -> Result<Arg, QueryError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Arg::Str(s)),
            Some(Token::Param(p)) => Ok(Arg::Param(p)),
            Some(Token::Ident(i)) if i == "__" => Ok(Arg::Anon(self.chain()?)),
            Some(Token::Ident(i)) => Ok(Arg::Ident(i)),
            other => Err(rejected(format!("unexpected argument {:?}", other))),
        }
    }

    fn script(&mut self) -> Result<Vec<Call>, QueryError> {
        if self.ident()? != "g" {
            return Err(rejected("script must start with 'g'"));
        }
        self.expect(Token::Dot)?;
        let source = self.call()?;
        if source.name != "V" || !source.args.is_empty() {
            return Err(rejected("script must start with g.V()"));
        }
        let calls = self.chain()?;
        if self.pos < self.tokens.len() {
            return Err(rejected(format!("trailing input at token {}", self.pos)));
        }
        Ok(calls)
    }

    fn binding(&self, name: &str) -> Result<Value, QueryError> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| rejected(format!("unbound parameter ${}", name)))
    }
}

fn str_arg(call: &Call, idx: usize) -> Result<&str, QueryError> {
    match call.args.get(idx) {
        Some(Arg::Str(s)) => Ok(s.as_str()),
        _ => Err(rejected(format!("{}() expects a string literal at position {}", call.name, idx))),
    }
}

fn arity(call: &Call, n: usize) -> Result<(), QueryError> {
    if call.args.len() == n {
        Ok(())
    } else {
        Err(rejected(format!("{}() takes {} arguments, got {}", call.name, n, call.args.len())))
    }
}

impl Parser<'_> {
    fn value_arg(&self, call: &Call, idx: usize) -> Result<Value, QueryError> {
        match call.args.get(idx) {
            Some(Arg::Param(p)) => self.binding(p),
            _ => Err(rejected(format!("{}() expects a parameter at position {}", call.name, idx))),
        }
    }

    fn node_type_arg(&self, call: &Call) -> Result<NodeType, QueryError> {
        arity(call, 1)?;
        match self.value_arg(call, 0)? {
            Value::String(s) => Ok(NodeType::from(s)),
            other => Err(rejected(format!("hasLabel() expects a string, got {}", other))),
        }
    }

    fn op(&self, call: &Call) -> Result<TraversalOp, QueryError> {
        match call.name.as_str() {
            "has" => {
                arity(call, 2)?;
                Ok(TraversalOp::HasProperty {
                    key: str_arg(call, 0)?.to_string(),
                    value: self.value_arg(call, 1)?,
                })
            }
            "hasLabel" => Ok(TraversalOp::HasType { node_type: self.node_type_arg(call)? }),
            "out" | "in" | "both" => {
                arity(call, 2)?;
                let direction = match call.name.as_str() {
                    "out" => Direction::Out,
                    "in" => Direction::In,
                    _ => Direction::Both,
                };
                let relationship = match call.args.get(1) {
                    Some(Arg::Ident(i)) if i == "CONTAINMENT" => Relationship::Containment,
                    Some(Arg::Ident(i)) if i == "PEER" => Relationship::Peer,
                    other => return Err(rejected(format!("unknown relationship {:?}", other))),
                };
                Ok(TraversalOp::Traverse {
                    label: str_arg(call, 0)?.to_string(),
                    direction,
                    relationship,
                })
            }
            "union" => {
                let mut branches = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    match arg {
                        Arg::Anon(calls) => branches.push(self.ops(calls)?),
                        other => return Err(rejected(format!("union() expects __ traversals, got {:?}", other))),
                    }
                }
                Ok(TraversalOp::Branch { branches })
            }
            "groupCount" => {
                arity(call, 1)?;
                Ok(TraversalOp::GroupCount { key: str_arg(call, 0)?.to_string() })
            }
            other => Err(rejected(format!("unsupported step {}()", other))),
        }
    }

    fn ops(&self, calls: &[Call]) -> Result<Vec<TraversalOp>, QueryError> {
        calls.iter().map(|c| self.op(c)).collect()
    }

    fn request(&self, calls: Vec<Call>) -> Result<TraversalRequest, QueryError> {
        let marker = calls
            .iter()
            .position(|c| c.name == "as" && matches!(c.args.as_slice(), [Arg::Str(s)] if s == START_MARKER))
            .ok_or_else(|| rejected("missing start marker"))?;

        let mut start = StartPredicate::default();
        for call in &calls[..marker] {
            match call.name.as_str() {
                "hasLabel" => start.node_type = Some(self.node_type_arg(call)?),
                "has" => {
                    arity(call, 2)?;
                    start.properties.push((str_arg(call, 0)?.to_string(), self.value_arg(call, 1)?));
                }
                other => return Err(rejected(format!("{}() not allowed before the start marker", other))),
            }
        }

        let rest = &calls[marker + 1..];
        let (last, body) = rest.split_last().ok_or_else(|| rejected("missing terminal step"))?;
        if !last.args.is_empty() {
            return Err(rejected(format!("{}() takes no arguments", last.name)));
        }
        let mode = match last.name.as_str() {
            "toList" => ExecutionMode::Vertices,
            "tree" => ExecutionMode::Tree,
            "next" => ExecutionMode::Groups,
            other => return Err(rejected(format!("unknown terminal step {}()", other))),
        };

        Ok(TraversalRequest {
            start,
            operations: self.ops(body)?,
            mode,
        })
    }
}

/// Parse script text produced by [`render`] back into a request.
pub fn parse(script: &str, bindings: &Bindings) -> Result<TraversalRequest, QueryError> {
    let mut parser = Parser {
        tokens: tokenize(script)?,
        pos: 0,
        bindings,
    };
    let calls = parser.script()?;
    parser.request(calls)
}

// ---------------------------------------------------------------------------
// Engine + backend
// ---------------------------------------------------------------------------

/// Evaluates script text against an in-memory graph.
pub struct ScriptEngine {
    graph: Arc<InMemoryGraph>,
}

impl ScriptEngine {
    pub fn new(graph: Arc<InMemoryGraph>) -> Self {
        Self { graph }
    }

    pub fn eval(&self, script: &str, bindings: &Bindings) -> Result<RawResult, QueryError> {
        let request = parse(script, bindings)?;
        interpreter::run(&self.graph, &request)
    }
}

pub struct ScriptBackend {
    engine: ScriptEngine,
}

impl ScriptBackend {
    pub fn new(graph: Arc<InMemoryGraph>) -> Self {
        Self {
            engine: ScriptEngine::new(graph),
        }
    }
}

#[async_trait]
impl TraversalBackend for ScriptBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Script
    }

    async fn run(&self, request: &TraversalRequest) -> Result<RawResult, QueryError> {
        let (script, bindings) = render(request);
        tracing::debug!("Evaluating script with {} bindings: {}", bindings.len(), script);
        self.engine.eval(&script, &bindings)
    }
}
