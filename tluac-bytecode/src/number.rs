/// A numeric literal as produced by the lexer.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Float(f64),
    Integer(i64),
}

impl Number {
    pub fn as_float(self) -> f64 {
        match self {
            Number::Float(f) => f,
            Number::Integer(i) => i as f64,
        }
    }

    /// Normalizes a float result to an integer when it holds an integral value
    /// that `i64` represents exactly, matching how the constant pool stores
    /// numbers.
    pub fn normalized(f: f64) -> Self {
        // 2^63, the first float past `i64::MAX`.
        const I64_END: f64 = 9_223_372_036_854_775_808.0;

        if f.fract() == 0.0 && (-I64_END..I64_END).contains(&f) {
            // -0.0 must stay a float so it is not merged with 0.
            if f == 0.0 && f.is_sign_negative() {
                return Number::Float(f);
            }
            Number::Integer(f as i64)
        } else {
            Number::Float(f)
        }
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Float(l0), Number::Float(r0)) => l0 == r0,
            (Number::Integer(l0), Number::Integer(r0)) => l0 == r0,
            (Number::Float(l0), Number::Integer(r0)) => *l0 == *r0 as f64,
            (Number::Integer(l0), Number::Float(r0)) => *l0 as f64 == *r0,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.as_float().partial_cmp(&other.as_float())
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Float(n) => f.write_str(&format_g14(n)),
        }
    }
}

/// Formats a float the way C's `%.14g` does.
pub fn format_g14(n: f64) -> String {
    const PRECISION: i32 = 14;

    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
