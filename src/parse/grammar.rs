use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, fail, not, opt, preceded, repeat, terminated};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::{ArithOp, Assignment, CompareOp, Expr, Value};

use super::TypeName;

// -- Whitespace -------------------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

// -- Identifiers & paths ----------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .context(StrContext::Expected(StrContextValue::Description(
            "identifier",
        )))
        .parse_next(input)
}

fn path(input: &mut &str) -> ModalResult<Vec<String>> {
    let first = ident.parse_next(input)?;
    let rest: Vec<&str> = repeat(0.., preceded('.', cut_err(ident))).parse_next(input)?;
    Ok(std::iter::once(first)
        .chain(rest)
        .map(str::to_owned)
        .collect())
}

// -- Literals ---------------------------------------------------------------

fn quoted(mut quote: char) -> impl FnMut(&mut &str) -> ModalResult<String> {
    move |input: &mut &str| {
        quote.parse_next(input)?;
        let mut s = String::new();
        loop {
            let ch = cut_err(any)
                .context(StrContext::Expected(StrContextValue::CharLiteral(quote)))
                .parse_next(input)?;
            match ch {
                c if c == quote => return Ok(s),
                '\\' => {
                    let esc = cut_err(any).parse_next(input)?;
                    match esc {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        '"' | '\'' | '\\' => s.push(esc),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                }
                c => s.push(c),
            }
        }
    }
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    alt((quoted('"'), quoted('\''))).parse_next(input)
}

fn exponent<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)
        .take()
        .parse_next(input)
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    // a float needs a decimal point or an exponent: `1.5`, `.5`, `1e3`
    alt((
        (digit1, '.', digit1, opt(exponent)).take(),
        ('.', digit1, opt(exponent)).take(),
        (digit1, exponent).take(),
    ))
    .try_map(str::parse::<f64>)
    .verify(|f: &f64| f.is_finite())
    .parse_next(input)
}

fn int_literal(input: &mut &str) -> ModalResult<i64> {
    digit1.try_map(str::parse::<i64>).parse_next(input)
}

/// The digits after a unary minus, read as one negative integer so that
/// `i64::MIN` is expressible.
fn negative_int(input: &mut &str) -> ModalResult<i64> {
    terminated(digit1, not(one_of(['.', 'e', 'E'])))
        .try_map(|digits: &str| format!("-{digits}").parse::<i64>())
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<Value> {
    alt((
        float_literal.map(Value::Float),
        int_literal.map(Value::Int),
    ))
    .parse_next(input)
}

// -- Operators --------------------------------------------------------------

fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    ws.parse_next(input)?;
    alt((
        ">=".value(CompareOp::Gte),
        ">".value(CompareOp::Gt),
        "<=".value(CompareOp::Lte),
        "<".value(CompareOp::Lt),
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Neq),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut &str) -> ModalResult<ArithOp> {
    ws.parse_next(input)?;
    alt(('+'.value(ArithOp::Add), '-'.value(ArithOp::Sub))).parse_next(input)
}

fn multiplicative_op(input: &mut &str) -> ModalResult<ArithOp> {
    ws.parse_next(input)?;
    alt((
        '*'.value(ArithOp::Mul),
        '/'.value(ArithOp::Div),
        '%'.value(ArithOp::Rem),
    ))
    .parse_next(input)
}

// -- Expressions ------------------------------------------------------------
// precedence: || < && < comparison < + - < * / % < unary < primary

/// Parentheses and prefix operators deeper than this are rejected.
const MAX_NESTING: usize = 64;

fn descend(input: &mut &str, depth: usize) -> ModalResult<usize> {
    if depth < MAX_NESTING {
        return Ok(depth + 1);
    }
    cut_err(fail)
        .context(StrContext::Label("expression nesting"))
        .parse_next(input)
}

fn path_or_keyword(input: &mut &str) -> ModalResult<Expr> {
    let segments = path.parse_next(input)?;
    if let [single] = segments.as_slice() {
        match single.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }
    }
    Ok(Expr::Path(segments))
}

fn parenthesized(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    '('.parse_next(input)?;
    let depth = descend(input, depth)?;
    let inner = cut_err(|i: &mut &str| expr(i, depth)).parse_next(input)?;
    (ws, cut_err(')')).parse_next(input)?;
    Ok(inner)
}

fn primary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        |i: &mut &str| parenthesized(i, depth),
        string_literal.map(|s| Expr::Literal(Value::String(s))),
        number.map(Expr::Literal),
        path_or_keyword,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn unary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    if opt(('!', not('='))).parse_next(input)?.is_some() {
        let depth = descend(input, depth)?;
        let inner = cut_err(|i: &mut &str| unary(i, depth)).parse_next(input)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    if opt('-').parse_next(input)?.is_some() {
        if let Some(n) = opt(preceded(ws, negative_int)).parse_next(input)? {
            return Ok(Expr::Literal(Value::Int(n)));
        }
        let depth = descend(input, depth)?;
        let inner = cut_err(|i: &mut &str| unary(i, depth)).parse_next(input)?;
        return Ok(match inner {
            Expr::Literal(Value::Int(n)) if n != i64::MIN => Expr::Literal(Value::Int(-n)),
            Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
            other => Expr::Neg(Box::new(other)),
        });
    }
    primary(input, depth)
}

fn multiplicative(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = unary(input, depth)?;
    let rest: Vec<(ArithOp, Expr)> = repeat(
        0..,
        (multiplicative_op, cut_err(|i: &mut &str| unary(i, depth))),
    )
    .parse_next(input)?;
    Ok(rest.into_iter().fold(first, |left, (op, right)| Expr::Arith {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }))
}

fn additive(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = multiplicative(input, depth)?;
    let rest: Vec<(ArithOp, Expr)> = repeat(
        0..,
        (additive_op, cut_err(|i: &mut &str| multiplicative(i, depth))),
    )
    .parse_next(input)?;
    Ok(rest.into_iter().fold(first, |left, (op, right)| Expr::Arith {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }))
}

fn comparison(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let left = additive(input, depth)?;
    let checkpoint = input.checkpoint();
    if let Ok(op) = compare_op.parse_next(input) {
        let right = cut_err(|i: &mut &str| additive(i, depth)).parse_next(input)?;
        Ok(Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    } else {
        input.reset(&checkpoint);
        Ok(left)
    }
}

fn and_expr(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = comparison(input, depth)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded((ws, "&&"), cut_err(|i: &mut &str| comparison(i, depth))),
    )
    .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::And(Box::new(acc), Box::new(r))))
}

fn or_expr(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let first = and_expr(input, depth)?;
    let rest: Vec<Expr> = repeat(
        0..,
        preceded((ws, "||"), cut_err(|i: &mut &str| and_expr(i, depth))),
    )
    .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, r| Expr::Or(Box::new(acc), Box::new(r))))
}

fn expr(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    or_expr(input, depth)
}

pub(super) fn expression(input: &mut &str) -> ModalResult<Expr> {
    let e = expr(input, 0)?;
    ws.parse_next(input)?;
    Ok(e)
}

// -- Statements -------------------------------------------------------------

fn assignment(input: &mut &str) -> ModalResult<Assignment> {
    let target = path.parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(('=', not('=')))
        .context(StrContext::Expected(StrContextValue::CharLiteral('=')))
        .parse_next(input)?;
    let value = cut_err(|i: &mut &str| expr(i, 0)).parse_next(input)?;
    Ok(Assignment { target, value })
}

/// `stmt (';' stmt)*` where empty statements are allowed anywhere.
pub(super) fn statements(input: &mut &str) -> ModalResult<Vec<Assignment>> {
    let mut out = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.is_empty() {
            return Ok(out);
        }
        if opt(';').parse_next(input)?.is_some() {
            continue;
        }
        out.push(assignment(input)?);
        ws.parse_next(input)?;
        if input.is_empty() {
            return Ok(out);
        }
        cut_err(';')
            .context(StrContext::Expected(StrContextValue::CharLiteral(';')))
            .parse_next(input)?;
    }
}

// -- Type names -------------------------------------------------------------

fn generic_list(input: &mut &str) -> ModalResult<TypeName> {
    ("List", ws, '<').parse_next(input)?;
    let inner = cut_err(type_name).parse_next(input)?;
    (ws, cut_err('>')).parse_next(input)?;
    Ok(TypeName::List(Box::new(inner)))
}

fn type_name(input: &mut &str) -> ModalResult<TypeName> {
    ws.parse_next(input)?;
    let base = alt((generic_list, ident.map(|n| TypeName::Named(n.to_owned()))))
        .context(StrContext::Expected(StrContextValue::Description("type")))
        .parse_next(input)?;
    let arrays: Vec<()> = repeat(0.., (ws, '[', ws, ']').void()).parse_next(input)?;
    Ok(arrays
        .into_iter()
        .fold(base, |inner, ()| TypeName::List(Box::new(inner))))
}

pub(super) fn full_type(input: &mut &str) -> ModalResult<TypeName> {
    let t = type_name(input)?;
    ws.parse_next(input)?;
    Ok(t)
}
