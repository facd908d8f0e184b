//! Built-in functions available to configuration expressions.

use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Declare every built-in function on `ctx`.
pub fn declare(ctx: &mut Context<'_>) {
    ctx.declare_func("upper", FuncDef::builder().param(ParamType::String).build(upper));
    ctx.declare_func("lower", FuncDef::builder().param(ParamType::String).build(lower));
    ctx.declare_func("length", FuncDef::builder().param(ParamType::Any).build(length));
    ctx.declare_func(
        "join",
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::Any)
            .build(join),
    );
    ctx.declare_func("tostring", FuncDef::builder().param(ParamType::Any).build(tostring));
    ctx.declare_func(
        "lookup",
        FuncDef::builder()
            .param(ParamType::Any)
            .param(ParamType::String)
            .param(ParamType::Any)
            .build(lookup),
    );
}

fn string_arg(args: &FuncArgs, index: usize) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(format!("argument {} must be a string, found {:?}", index + 1, other)),
    }
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(string_arg(&args, 0)?.to_uppercase()))
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(string_arg(&args, 0)?.to_lowercase()))
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let len = match args.first() {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        other => return Err(format!("cannot take the length of {:?}", other)),
    };
    Ok(Value::from(len as u64))
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let Some(Value::Array(items)) = args.get(1) else {
        return Err("second argument must be a list of strings".to_string());
    };
    let parts = items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot join {:?}", other)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(&separator)))
}

fn tostring(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::String(s.clone())),
        Some(Value::Number(n)) => Ok(Value::String(n.to_string())),
        Some(Value::Bool(b)) => Ok(Value::String(b.to_string())),
        Some(Value::Null) => Ok(Value::Null),
        other => Err(format!("cannot convert {:?} to a string", other)),
    }
}

fn lookup(args: FuncArgs) -> Result<Value, String> {
    let key = string_arg(&args, 1)?;
    match args.first() {
        Some(Value::Object(map)) => Ok(map
            .get(&key)
            .cloned()
            .or_else(|| args.get(2).cloned())
            .unwrap_or(Value::Null)),
        other => Err(format!("lookup expects a map, found {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcl::eval::Evaluate;

    fn eval(expr: &str) -> Value {
        let body = hcl::parse(&format!("x = {}", expr)).unwrap();
        let mut ctx = Context::new();
        declare(&mut ctx);
        let attribute = body.attributes().next().unwrap();
        attribute.expr().evaluate(&ctx).unwrap()
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval(r#"upper("abc")"#), Value::from("ABC"));
        assert_eq!(eval(r#"length(["a", "b"])"#), Value::from(2u64));
        assert_eq!(eval(r#"join("-", ["a", "b"])"#), Value::from("a-b"));
        assert_eq!(eval(r#"lookup({ a = 1 }, "b", 2)"#), Value::from(2u64));
        assert_eq!(eval("tostring(5)"), Value::from("5"));
    }
}
