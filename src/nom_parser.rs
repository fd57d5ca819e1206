use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case};
use nom::character::complete::{anychar, char, digit0, digit1, one_of};
use nom::combinator::{all_consuming, map, map_opt, map_res, opt, recognize, value};
use nom::multi::{fold_many0, many0};
use nom::number::complete::recognize_float;
use nom::sequence::{pair, preceded};
use nom::IResult;

pub(crate) mod template {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub(crate) struct Flags {
        pub left: bool,
        pub plus: bool,
        pub space: bool,
        pub zero: bool,
        pub alternate: bool,
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub(crate) enum Conversion {
        Decimal,
        Fixed { upper: bool },
        Exponent { upper: bool },
        General { upper: bool },
        Text,
        Repr,
        Hex { upper: bool },
        Octal,
        Char,
    }

    impl Conversion {
        fn from_char(c: char) -> Option<Self> {
            use Conversion::*;
            Some(match c {
                'd' | 'i' | 'u' => Decimal,
                'f' => Fixed { upper: false },
                'F' => Fixed { upper: true },
                'e' => Exponent { upper: false },
                'E' => Exponent { upper: true },
                'g' => General { upper: false },
                'G' => General { upper: true },
                's' => Text,
                'r' | 'a' => Repr,
                'x' => Hex { upper: false },
                'X' => Hex { upper: true },
                'o' => Octal,
                'c' => Char,
                _ => return None,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Spec {
        pub raw: String,
        pub flags: Flags,
        pub width: Option<usize>,
        pub precision: Option<usize>,
        pub conversion: Conversion,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Segment {
        Literal(String),
        Spec(Spec),
    }

    /// Split a printf-style template into literal text and conversion specifiers.
    /// Returns the unparsed remainder on failure.
    pub(crate) fn parse_template(input: &str) -> Result<Vec<Segment>, String> {
        match all_consuming(many0(alt((percent_escape, specifier, literal))))(input) {
            Ok((_, segments)) => Ok(segments),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.input.to_string()),
            Err(nom::Err::Incomplete(_)) => Err(input.to_string()),
        }
    }

    fn literal(buf: &str) -> IResult<&str, Segment> {
        map(is_not("%"), |s: &str| Segment::Literal(s.to_string()))(buf)
    }

    fn percent_escape(buf: &str) -> IResult<&str, Segment> {
        value(Segment::Literal("%".to_string()), tag("%%"))(buf)
    }

    fn specifier(buf: &str) -> IResult<&str, Segment> {
        let start = buf;
        let (buf, _) = char('%')(buf)?;
        let (buf, flags) = fold_many0(one_of("-+ 0#"), Flags::default, |mut f, c| {
            match c {
                '-' => f.left = true,
                '+' => f.plus = true,
                ' ' => f.space = true,
                '0' => f.zero = true,
                _ => f.alternate = true,
            }
            f
        })(buf)?;
        let (buf, width) = opt(map_res(digit1, str::parse::<usize>))(buf)?;
        let (buf, precision) = opt(preceded(
            char('.'),
            map_res(digit0, |d: &str| {
                if d.is_empty() {
                    Ok(0)
                } else {
                    d.parse::<usize>()
                }
            }),
        ))(buf)?;
        let (buf, _length) = opt(one_of("hlL"))(buf)?;
        let (buf, conversion) = map_opt(anychar, Conversion::from_char)(buf)?;
        let raw = start[..start.len() - buf.len()].to_string();
        Ok((
            buf,
            Segment::Spec(Spec {
                raw,
                flags,
                width,
                precision,
                conversion,
            }),
        ))
    }

}

pub(crate) mod number {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq)]
    pub(crate) enum Number {
        Int(i64),
        Float(f64),
    }

    impl Number {
        pub fn as_f64(self) -> f64 {
            match self {
                Number::Int(i) => i as f64,
                Number::Float(f) => f,
            }
        }
    }

    /// Parse a complete numeric token, as instruments print them:
    /// `42`, `-3`, `+1.50E+01`, `.5`, `9.91E37`, `inf`, `NaN`.
    pub(crate) fn parse_number(token: &str) -> Option<Number> {
        match all_consuming(alt((integer, float, special)))(token) {
            Ok((_, n)) => Some(n),
            Err(_) => None,
        }
    }

    fn integer(buf: &str) -> IResult<&str, Number> {
        map_res(
            all_consuming(recognize(pair(opt(one_of("+-")), digit1))),
            |s: &str| s.parse::<i64>().map(Number::Int),
        )(buf)
    }

    fn float(buf: &str) -> IResult<&str, Number> {
        map_res(recognize_float, |s: &str| s.parse::<f64>().map(Number::Float))(buf)
    }

    fn special(buf: &str) -> IResult<&str, Number> {
        map_res(
            recognize(pair(
                opt(one_of("+-")),
                alt((tag_no_case("infinity"), tag_no_case("inf"), tag_no_case("nan"))),
            )),
            |s: &str| s.parse::<f64>().map(Number::Float),
        )(buf)
    }

}
