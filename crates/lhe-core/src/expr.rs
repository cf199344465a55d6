//! Expression engine for kinematic observables and cut functions.
//!
//! Expressions are written against up to two bound four-vectors, `X` and
//! `Y`, e.g. `X.Pt()`, `(X+Y).M()` or `abs(X.Eta() - Y.Eta())`. The grammar
//! is closed: the only names that resolve are `X`, `Y`, the constants `pi`,
//! `e`, `tau`, `inf`, `nan` and `beam_energy`, the functions of the built-in
//! math table (bare or with a `math.` prefix) and the accessor methods of
//! [`FourVector`] and, through `Vect()`, [`ThreeVector`].
//!
//! Supports arithmetic (`+ - * / // % **`), comparisons (`== != < <= > >=`,
//! chainable as in `0 < X.Eta() < 2.5`) and boolean operators (`&& || !` or
//! `and or not`); booleans evaluate to 1.0 or 0.0. `%` and `//` follow floor
//! semantics: the remainder takes the sign of the divisor.

use crate::error::{LheError, Result};
use crate::event::Particle;
use crate::kinematics::{FourVector, ThreeVector};

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    BeamEnergy,
    Var(Slot),
    UnaryNeg(Box<Expr>),
    UnaryNot(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c`: each operand evaluated once, stops at the first false link.
    Compare(Box<Expr>, Vec<(BinOp, Expr)>),
    Call(Func, Vec<Expr>),
    Method(Box<Expr>, Method, Option<Box<Expr>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Min,
    Max,
    Sqrt,
    Exp,
    Expm1,
    Log,
    Log10,
    Log2,
    Log1p,
    Pow,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Floor,
    Ceil,
    Trunc,
    Hypot,
    Fmod,
    Copysign,
    Degrees,
    Radians,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "abs" | "fabs" => Func::Abs,
            "min" => Func::Min,
            "max" => Func::Max,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "expm1" => Func::Expm1,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "log2" => Func::Log2,
            "log1p" => Func::Log1p,
            "pow" => Func::Pow,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "atan2" => Func::Atan2,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "asinh" => Func::Asinh,
            "acosh" => Func::Acosh,
            "atanh" => Func::Atanh,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "trunc" => Func::Trunc,
            "hypot" => Func::Hypot,
            "fmod" => Func::Fmod,
            "copysign" => Func::Copysign,
            "degrees" => Func::Degrees,
            "radians" => Func::Radians,
            _ => return None,
        })
    }

    /// Accepted argument counts (`None` upper bound = variadic).
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Min | Func::Max => (1, None),
            Func::Log => (1, Some(2)),
            Func::Pow | Func::Atan2 | Func::Hypot | Func::Fmod | Func::Copysign => (2, Some(2)),
            _ => (1, Some(1)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Px,
    Py,
    Pz,
    E,
    P,
    Pt,
    Pt2,
    Et,
    Eta,
    Phi,
    Rapidity,
    Theta,
    CosTheta,
    M,
    M2,
    Mt,
    Mt2,
    Beta,
    Gamma,
    DeltaR,
    DeltaPhi,
    Angle,
    Dot,
    Vect,
}

impl Method {
    fn lookup(name: &str) -> Option<Method> {
        Some(match name {
            "Px" | "X" => Method::Px,
            "Py" | "Y" => Method::Py,
            "Pz" | "Z" => Method::Pz,
            "E" | "T" | "Energy" => Method::E,
            "P" | "Rho" => Method::P,
            "Pt" | "Perp" => Method::Pt,
            "Pt2" | "Perp2" => Method::Pt2,
            "Et" => Method::Et,
            "Eta" | "PseudoRapidity" => Method::Eta,
            "Phi" => Method::Phi,
            "Rapidity" => Method::Rapidity,
            "Theta" => Method::Theta,
            "CosTheta" => Method::CosTheta,
            "M" | "Mag" => Method::M,
            "M2" | "Mag2" => Method::M2,
            "Mt" => Method::Mt,
            "Mt2" => Method::Mt2,
            "Beta" => Method::Beta,
            "Gamma" => Method::Gamma,
            "DeltaR" => Method::DeltaR,
            "DeltaPhi" => Method::DeltaPhi,
            "Angle" => Method::Angle,
            "Dot" => Method::Dot,
            "Vect" => Method::Vect,
            _ => return None,
        })
    }

    fn takes_vector(self) -> bool {
        matches!(self, Method::DeltaR | Method::DeltaPhi | Method::Angle | Method::Dot)
    }

    fn apply(self, recv: Value, other: Option<Value>) -> std::result::Result<Value, String> {
        match recv {
            Value::Vector(v) => self.apply_four(&v, other),
            Value::Three(v) => self.apply_three(&v, other),
            Value::Num(_) => Err(format!("method {self:?}() needs a vector, got a number")),
        }
    }

    fn apply_four(self, v: &FourVector, other: Option<Value>) -> std::result::Result<Value, String> {
        let arg = || -> std::result::Result<FourVector, String> {
            other
                .ok_or_else(|| format!("method {self:?}() needs an argument"))?
                .vector("method argument")
        };
        Ok(Value::Num(match self {
            Method::DeltaR => v.delta_r(&arg()?),
            Method::DeltaPhi => v.delta_phi(&arg()?),
            Method::Angle => v.angle(&arg()?),
            Method::Dot => v.dot(&arg()?),
            Method::Vect => return Ok(Value::Three(v.vect())),
            Method::Px => v.px,
            Method::Py => v.py,
            Method::Pz => v.pz,
            Method::E => v.e,
            Method::P => v.p(),
            Method::Pt => v.pt(),
            Method::Pt2 => v.pt2(),
            Method::Et => v.et(),
            Method::Eta => v.eta(),
            Method::Phi => v.phi(),
            Method::Rapidity => v.rapidity(),
            Method::Theta => v.theta(),
            Method::CosTheta => v.cos_theta(),
            Method::M => v.mass(),
            Method::M2 => v.m2(),
            Method::Mt => v.mt(),
            Method::Mt2 => v.mt2(),
            Method::Beta => v.beta(),
            Method::Gamma => v.gamma(),
        }))
    }

    /// Three-vector accessors; `M`/`Mag` and `M2`/`Mag2` are the magnitude.
    fn apply_three(self, v: &ThreeVector, other: Option<Value>) -> std::result::Result<Value, String> {
        let arg = || -> std::result::Result<ThreeVector, String> {
            other
                .ok_or_else(|| format!("method {self:?}() needs an argument"))?
                .three("method argument")
        };
        Ok(Value::Num(match self {
            Method::DeltaR => v.delta_r(&arg()?),
            Method::DeltaPhi => v.delta_phi(&arg()?),
            Method::Angle => v.angle(&arg()?),
            Method::Dot => v.dot(&arg()?),
            Method::Px => v.x,
            Method::Py => v.y,
            Method::Pz => v.z,
            Method::P | Method::M => v.mag(),
            Method::M2 => v.mag2(),
            Method::Pt => v.perp(),
            Method::Pt2 => v.perp2(),
            Method::Eta => v.eta(),
            Method::Phi => v.phi(),
            Method::Theta => v.theta(),
            Method::CosTheta => v.cos_theta(),
            _ => return Err(format!("method {self:?}() is not defined for a three-vector")),
        }))
    }
}

// ── Compiled expression ────────────────────────────────────────

/// A compiled kinematic expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
    uses_y: bool,
}

impl CompiledExpr {
    /// Parse and compile an expression over `X` and `Y`.
    pub fn compile(input: &str) -> Result<Self> {
        Self::compile_with(input, false)
    }

    /// Compile a cut function.
    ///
    /// Cut functions may use the receiver shorthand, where a bare method call
    /// such as `Pt()` or `M()` is applied to `X`.
    pub fn compile_cut(input: &str) -> Result<Self> {
        Self::compile_with(input, true)
    }

    fn compile_with(input: &str, receiver_shorthand: bool) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(LheError::expression(input, "expression is empty"));
        }
        let tokens = tokenize(input).map_err(|e| LheError::expression(input, e))?;
        let mut parser = Parser::new(&tokens, receiver_shorthand);
        let ast = parser.parse_or().map_err(|e| LheError::expression(input, e))?;
        if parser.pos < parser.tokens.len() {
            return Err(LheError::expression(
                input,
                format!("unexpected token after expression: {:?}", parser.tokens[parser.pos]),
            ));
        }
        Ok(CompiledExpr { source: input.to_string(), ast, uses_y: parser.uses_y })
    }

    /// Expression text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// `true` if the expression references `Y` and therefore needs a pair.
    pub fn uses_y(&self) -> bool {
        self.uses_y
    }

    /// Evaluate against bound vectors.
    pub fn eval(&self, x: &FourVector, y: Option<&FourVector>, beam_energy: f64) -> Result<f64> {
        let env = Env { x, y, beam_energy };
        match eval_expr(&self.ast, &env) {
            Ok(Value::Num(v)) => Ok(v),
            Ok(other) => Err(LheError::expression(
                &self.source,
                format!("expression evaluates to {}, expected a number", other.kind()),
            )),
            Err(reason) => Err(LheError::expression(&self.source, reason)),
        }
    }

    /// Evaluate against particles, failing if a bound particle has no vector.
    pub fn eval_particles(
        &self,
        x: &Particle,
        y: Option<&Particle>,
        beam_energy: f64,
    ) -> Result<f64> {
        let xv = x.vector.as_ref().ok_or_else(|| {
            LheError::expression(
                &self.source,
                format!("first particle (id {}) has no four-vector", x.type_id),
            )
        })?;
        let yv = match y {
            Some(p) => Some(p.vector.as_ref().ok_or_else(|| {
                LheError::expression(
                    &self.source,
                    format!("second particle (id {}) has no four-vector", p.type_id),
                )
            })?),
            None => None,
        };
        self.eval(xv, yv, beam_energy)
    }
}

/// Compile and evaluate `expr` in one step.
pub fn evaluate(expr: &str, x: &FourVector, y: Option<&FourVector>) -> Result<f64> {
    CompiledExpr::compile(expr)?.eval(x, y, 0.0)
}

// ── Evaluation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Value {
    Num(f64),
    Vector(FourVector),
    Three(ThreeVector),
}

impl Value {
    fn kind(self) -> &'static str {
        match self {
            Value::Num(_) => "a number",
            Value::Vector(_) => "a four-vector",
            Value::Three(_) => "a three-vector",
        }
    }

    fn num(self, what: &str) -> std::result::Result<f64, String> {
        match self {
            Value::Num(v) => Ok(v),
            other => Err(format!("{what} expects a number, got {}", other.kind())),
        }
    }

    fn vector(self, what: &str) -> std::result::Result<FourVector, String> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(format!("{what} expects a four-vector, got {}", other.kind())),
        }
    }

    fn three(self, what: &str) -> std::result::Result<ThreeVector, String> {
        match self {
            Value::Three(v) => Ok(v),
            other => Err(format!("{what} expects a three-vector, got {}", other.kind())),
        }
    }
}

struct Env<'a> {
    x: &'a FourVector,
    y: Option<&'a FourVector>,
    beam_energy: f64,
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn eval_expr(e: &Expr, env: &Env<'_>) -> std::result::Result<Value, String> {
    Ok(match e {
        Expr::Number(n) => Value::Num(*n),
        Expr::BeamEnergy => Value::Num(env.beam_energy),
        Expr::Var(Slot::X) => Value::Vector(*env.x),
        Expr::Var(Slot::Y) => match env.y {
            Some(y) => Value::Vector(*y),
            None => return Err("'Y' is not bound (expression needs a particle pair)".into()),
        },
        Expr::UnaryNeg(a) => match eval_expr(a, env)? {
            Value::Num(v) => Value::Num(-v),
            Value::Vector(v) => Value::Vector(-v),
            Value::Three(v) => Value::Three(-v),
        },
        Expr::UnaryNot(a) => Value::Num(flag(!truthy(eval_expr(a, env)?.num("'not'")?))),
        Expr::BinOp(op, a, b) => eval_binop(*op, eval_expr(a, env)?, eval_expr(b, env)?)?,
        Expr::Compare(first, links) => {
            let mut lhs = eval_expr(first, env)?;
            for (op, e) in links {
                let rhs = eval_expr(e, env)?;
                if !truthy(eval_binop(*op, lhs, rhs)?.num("comparison")?) {
                    return Ok(Value::Num(0.0));
                }
                lhs = rhs;
            }
            Value::Num(1.0)
        }
        Expr::Call(f, args) => {
            let vals = args
                .iter()
                .map(|a| eval_expr(a, env)?.num("function argument"))
                .collect::<std::result::Result<Vec<f64>, String>>()?;
            Value::Num(call(*f, &vals)?)
        }
        Expr::Method(recv, m, arg) => {
            let v = eval_expr(recv, env)?;
            let other = match arg {
                Some(a) => Some(eval_expr(a, env)?),
                None => None,
            };
            m.apply(v, other)?
        }
    })
}

fn eval_binop(op: BinOp, lhs: Value, rhs: Value) -> std::result::Result<Value, String> {
    match (op, lhs, rhs) {
        (BinOp::Add, Value::Vector(a), Value::Vector(b)) => return Ok(Value::Vector(a + b)),
        (BinOp::Sub, Value::Vector(a), Value::Vector(b)) => return Ok(Value::Vector(a - b)),
        (BinOp::Add, Value::Three(a), Value::Three(b)) => return Ok(Value::Three(a + b)),
        (BinOp::Sub, Value::Three(a), Value::Three(b)) => return Ok(Value::Three(a - b)),
        (BinOp::Add | BinOp::Sub, Value::Num(_), Value::Num(_)) => {}
        (BinOp::Add | BinOp::Sub, l, r) => {
            return Err(format!("cannot combine {} and {}", l.kind(), r.kind()));
        }
        _ => {}
    }
    let l = lhs.num("operator")?;
    let r = rhs.num("operator")?;
    Ok(Value::Num(match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                return Err("division by zero".into());
            }
            l / r
        }
        BinOp::FloorDiv => {
            if r == 0.0 {
                return Err("integer division or modulo by zero".into());
            }
            (l / r).floor()
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Err("integer division or modulo by zero".into());
            }
            floor_mod(l, r)
        }
        BinOp::Pow => power(l, r)?,
        BinOp::Eq => flag(l == r),
        BinOp::Ne => flag(l != r),
        BinOp::Lt => flag(l < r),
        BinOp::Le => flag(l <= r),
        BinOp::Gt => flag(l > r),
        BinOp::Ge => flag(l >= r),
        BinOp::And => flag(truthy(l) && truthy(r)),
        BinOp::Or => flag(truthy(l) || truthy(r)),
    }))
}

/// Remainder with the sign of the divisor.
fn floor_mod(l: f64, r: f64) -> f64 {
    let m = l % r;
    if m != 0.0 && (m < 0.0) != (r < 0.0) { m + r } else { m }
}

fn power(base: f64, exp: f64) -> std::result::Result<f64, String> {
    if base == 0.0 && exp < 0.0 {
        return Err("division by zero (zero raised to a negative power)".into());
    }
    domain_checked("pow", base.powf(exp), &[base, exp])
}

/// Reject NaN produced from non-NaN inputs (`sqrt(-1)`, `acos(2)`, ...).
fn domain_checked(name: &str, out: f64, args: &[f64]) -> std::result::Result<f64, String> {
    if out.is_nan() && !args.iter().any(|a| a.is_nan()) {
        Err(format!("math domain error in {name}({})", fmt_args(args)))
    } else {
        Ok(out)
    }
}

fn fmt_args(args: &[f64]) -> String {
    args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

fn call(f: Func, a: &[f64]) -> std::result::Result<f64, String> {
    let a0 = a[0];
    let out = match f {
        Func::Abs => a0.abs(),
        Func::Min => a.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => a.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Sqrt => a0.sqrt(),
        Func::Exp => a0.exp(),
        Func::Expm1 => a0.exp_m1(),
        Func::Log | Func::Log10 | Func::Log2 => {
            if a0 <= 0.0 {
                return Err(format!("math domain error in log({a0})"));
            }
            match (f, a.get(1)) {
                (Func::Log10, _) => a0.log10(),
                (Func::Log2, _) => a0.log2(),
                (_, None) => a0.ln(),
                (_, Some(&base)) => {
                    if base <= 0.0 {
                        return Err(format!("math domain error in log({a0}, {base})"));
                    }
                    if base == 1.0 {
                        return Err("division by zero (logarithm base 1)".into());
                    }
                    a0.ln() / base.ln()
                }
            }
        }
        Func::Log1p => {
            if a0 <= -1.0 {
                return Err(format!("math domain error in log1p({a0})"));
            }
            a0.ln_1p()
        }
        Func::Pow => return power(a0, a[1]),
        Func::Sin => a0.sin(),
        Func::Cos => a0.cos(),
        Func::Tan => a0.tan(),
        Func::Asin => a0.asin(),
        Func::Acos => a0.acos(),
        Func::Atan => a0.atan(),
        Func::Atan2 => a0.atan2(a[1]),
        Func::Sinh => a0.sinh(),
        Func::Cosh => a0.cosh(),
        Func::Tanh => a0.tanh(),
        Func::Asinh => a0.asinh(),
        Func::Acosh => a0.acosh(),
        Func::Atanh => {
            if a0.abs() >= 1.0 {
                return Err(format!("math domain error in atanh({a0})"));
            }
            a0.atanh()
        }
        Func::Floor => a0.floor(),
        Func::Ceil => a0.ceil(),
        Func::Trunc => a0.trunc(),
        Func::Hypot => a0.hypot(a[1]),
        // Remainder with the sign of the dividend, unlike `%`.
        Func::Fmod => a0 % a[1],
        Func::Copysign => a0.copysign(a[1]),
        Func::Degrees => a0.to_degrees(),
        Func::Radians => a0.to_radians(),
    };
    domain_checked(&format!("{f:?}").to_lowercase(), out, a)
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Dot,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if i + 1 < bytes.len() {
            let tok = match &bytes[i..i + 2] {
                b"&&" => Some(Token::And),
                b"||" => Some(Token::Or),
                b"==" => Some(Token::Eq),
                b"!=" => Some(Token::Ne),
                b"<=" => Some(Token::Le),
                b">=" => Some(Token::Ge),
                b"**" => Some(Token::StarStar),
                b"//" => Some(Token::SlashSlash),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            b'<' => Some(Token::Lt),
            b'>' => Some(Token::Gt),
            b'!' => Some(Token::Not),
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => Some(Token::Dot),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit()
                    || bytes[i] == b'.'
                    || bytes[i] == b'e'
                    || bytes[i] == b'E'
                    || ((bytes[i] == b'+' || bytes[i] == b'-')
                        && i > start
                        && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
            {
                i += 1;
            }
            let s = &input[start..i];
            let n: f64 = s.parse().map_err(|_| format!("invalid number: '{s}'"))?;
            tokens.push(Token::Num(n));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(match &input[start..i] {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                word => Token::Ident(word.to_string()),
            });
            continue;
        }

        let ch = input[i..].chars().next().unwrap_or('?');
        return Err(format!("unexpected character: '{ch}'"));
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

type ParseResult = std::result::Result<Expr, String>;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    receiver_shorthand: bool,
    uses_y: bool,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], receiver_shorthand: bool) -> Self {
        Self { tokens, pos: 0, receiver_shorthand, uses_y: false }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> std::result::Result<(), String> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(format!("expected {expected:?}, got {other:?}")),
        }
    }

    fn expect_ident(&mut self) -> std::result::Result<String, String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            other => Err(format!("expected a name after '.', got {other:?}")),
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_or(&mut self) -> ParseResult {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp_op(&self) -> Option<BinOp> {
        Some(match self.peek()? {
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            _ => return None,
        })
    }

    fn parse_cmp(&mut self) -> ParseResult {
        let first = self.parse_add()?;
        let mut links = Vec::new();
        while let Some(op) = self.cmp_op() {
            self.advance();
            links.push((op, self.parse_add()?));
        }
        Ok(match links.len() {
            0 => first,
            1 => {
                let (op, rhs) = links.remove(0);
                Expr::BinOp(op, Box::new(first), Box::new(rhs))
            }
            _ => Expr::Compare(Box::new(first), links),
        })
    }

    fn parse_add(&mut self) -> ParseResult {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> ParseResult {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNeg(Box::new(e)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNot(Box::new(e)))
            }
            _ => self.parse_power(),
        }
    }

    // `**` binds tighter than unary minus on its left and is right-associative.
    fn parse_power(&mut self) -> ParseResult {
        let base = self.parse_postfix()?;
        if matches!(self.peek(), Some(Token::StarStar)) {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr::BinOp(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult {
        let mut e = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::Dot)) {
            self.advance();
            let name = self.expect_ident()?;
            let method =
                Method::lookup(&name).ok_or_else(|| format!("unknown method: '{name}'"))?;
            e = self.parse_method_call(e, method, &name)?;
        }
        Ok(e)
    }

    fn parse_method_call(&mut self, receiver: Expr, method: Method, name: &str) -> ParseResult {
        self.expect(&Token::LParen)?;
        let args = self.parse_args()?;
        let arg = match (method.takes_vector(), args.len()) {
            (false, 0) => None,
            (true, 1) => args.into_iter().next().map(Box::new),
            (true, n) => return Err(format!("method '{name}' takes 1 argument, got {n}")),
            (false, n) => return Err(format!("method '{name}' takes no arguments, got {n}")),
        };
        Ok(Expr::Method(Box::new(receiver), method, arg))
    }

    /// Comma-separated arguments up to and including the closing paren.
    fn parse_args(&mut self) -> std::result::Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        args.push(self.parse_or()?);
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            args.push(self.parse_or()?);
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_function_call(&mut self, name: &str) -> ParseResult {
        let func = Func::lookup(name).ok_or_else(|| format!("unknown function: '{name}'"))?;
        let args = self.parse_args()?;
        let (lo, hi) = func.arity();
        if args.len() < lo || hi.is_some_and(|hi| args.len() > hi) {
            return Err(format!("function '{name}' called with {} argument(s)", args.len()));
        }
        Ok(Expr::Call(func, args))
    }

    fn resolve_name(&mut self, name: &str) -> ParseResult {
        match name {
            "X" => Ok(Expr::Var(Slot::X)),
            "Y" => {
                self.uses_y = true;
                Ok(Expr::Var(Slot::Y))
            }
            "pi" => Ok(Expr::Number(std::f64::consts::PI)),
            "e" => Ok(Expr::Number(std::f64::consts::E)),
            "tau" => Ok(Expr::Number(std::f64::consts::TAU)),
            "inf" => Ok(Expr::Number(f64::INFINITY)),
            "nan" => Ok(Expr::Number(f64::NAN)),
            "beam_energy" => Ok(Expr::BeamEnergy),
            _ => Err(format!("unknown name: '{name}'")),
        }
    }

    fn parse_atom(&mut self) -> ParseResult {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) if name == "math" => {
                // `math.sqrt(...)`, `math.pi`
                self.expect(&Token::Dot)?;
                let member = self.expect_ident()?;
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    self.parse_function_call(&member)
                } else {
                    match member.as_str() {
                        "pi" | "e" | "tau" | "inf" | "nan" => self.resolve_name(&member),
                        _ => Err(format!("unknown name: 'math.{member}'")),
                    }
                }
            }
            Some(Token::Ident(name)) => {
                if !matches!(self.peek(), Some(Token::LParen)) {
                    return self.resolve_name(&name);
                }
                self.advance(); // consume '('
                if Func::lookup(&name).is_some() {
                    return self.parse_function_call(&name);
                }
                match Method::lookup(&name) {
                    Some(method) if self.receiver_shorthand => {
                        // Put the '(' back; method calls parse their own parens.
                        self.pos -= 1;
                        self.parse_method_call(Expr::Var(Slot::X), method, &name)
                    }
                    _ => Err(format!("unknown function: '{name}'")),
                }
            }
            other => Err(format!("expected number, name, or '(', got {other:?}")),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
