//! Composable field operators for filter predicates.
//!
//! `op("gender").eq(b"M")` compares raw bytes without allocating;
//! `op("state").str().lower().eq("ar")` decodes first; `op("id").int().ge(5)`
//! parses the field. Each transformation stage composes once when the
//! predicate is built, not at every comparison.

use std::borrow::Cow;

use encoding_rs::Encoding;

use crate::line::{parse_int, trim_blanks, FwfLine};
use crate::view::{FwfViewLike, LinePredicate};
use crate::{FwfError, FwfResult};

/// Start building a predicate on the named field.
pub fn op(field: &str) -> FwfOperator {
    FwfOperator {
        field: field.to_string(),
        transforms: Vec::new(),
    }
}

#[derive(Clone, Copy)]
enum ByteTransform {
    Strip,
    Lower,
    Upper,
}

/// Operator over the raw bytes of a field.
pub struct FwfOperator {
    field: String,
    transforms: Vec<ByteTransform>,
}

impl FwfOperator {
    /// Drop surrounding blank padding. Zero-copy.
    pub fn strip(mut self) -> FwfOperator {
        self.transforms.push(ByteTransform::Strip);
        self
    }

    /// ASCII-lowercase the bytes.
    pub fn lower(mut self) -> FwfOperator {
        self.transforms.push(ByteTransform::Lower);
        self
    }

    /// ASCII-uppercase the bytes.
    pub fn upper(mut self) -> FwfOperator {
        self.transforms.push(ByteTransform::Upper);
        self
    }

    /// Continue with the field decoded into a string, using the view's
    /// encoding unless one is set with [`FwfStrOperator::encoding`].
    pub fn str(self) -> FwfStrOperator {
        FwfStrOperator {
            bytes: self,
            encoding: None,
            transforms: Vec::new(),
        }
    }

    /// Continue with the field parsed as a decimal integer.
    pub fn int(self) -> FwfIntOperator {
        FwfIntOperator { bytes: self }
    }

    fn value<'l>(&self, line: &FwfLine<'l>) -> FwfResult<Cow<'l, [u8]>> {
        let mut value: Cow<'l, [u8]> = Cow::Borrowed(line.get(&self.field)?);
        for transform in &self.transforms {
            value = match transform {
                ByteTransform::Strip => match value {
                    Cow::Borrowed(bytes) => Cow::Borrowed(trim_blanks(bytes)),
                    Cow::Owned(bytes) => Cow::Owned(trim_blanks(&bytes).to_vec()),
                },
                ByteTransform::Lower => Cow::Owned(value.to_ascii_lowercase()),
                ByteTransform::Upper => Cow::Owned(value.to_ascii_uppercase()),
            };
        }
        Ok(value)
    }

    pub fn eq(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() == other.as_slice()))
    }

    pub fn ne(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() != other.as_slice()))
    }

    pub fn lt(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() < other.as_slice()))
    }

    pub fn le(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() <= other.as_slice()))
    }

    pub fn gt(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() > other.as_slice()))
    }

    pub fn ge(self, other: &[u8]) -> LinePredicate {
        let other = other.to_vec();
        Box::new(move |line| Ok(self.value(line)?.as_ref() >= other.as_slice()))
    }

    pub fn is_in(self, others: &[&[u8]]) -> LinePredicate {
        let others: Vec<Vec<u8>> = others.iter().map(|other| other.to_vec()).collect();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(others.iter().any(|other| other.as_slice() == value.as_ref()))
        })
    }

    pub fn not_in(self, others: &[&[u8]]) -> LinePredicate {
        let others: Vec<Vec<u8>> = others.iter().map(|other| other.to_vec()).collect();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(others.iter().all(|other| other.as_slice() != value.as_ref()))
        })
    }
}

#[derive(Clone, Copy)]
enum StrTransform {
    Strip,
    Lower,
    Upper,
}

/// Operator over the decoded string value of a field.
pub struct FwfStrOperator {
    bytes: FwfOperator,
    encoding: Option<&'static Encoding>,
    transforms: Vec<StrTransform>,
}

impl FwfStrOperator {
    /// Decode with an explicit encoding instead of the view's.
    pub fn encoding(mut self, encoding: &'static Encoding) -> FwfStrOperator {
        self.encoding = Some(encoding);
        self
    }

    pub fn strip(mut self) -> FwfStrOperator {
        self.transforms.push(StrTransform::Strip);
        self
    }

    pub fn lower(mut self) -> FwfStrOperator {
        self.transforms.push(StrTransform::Lower);
        self
    }

    pub fn upper(mut self) -> FwfStrOperator {
        self.transforms.push(StrTransform::Upper);
        self
    }

    fn value(&self, line: &FwfLine) -> FwfResult<String> {
        let bytes = self.bytes.value(line)?;
        let encoding = self.encoding.unwrap_or_else(|| line.view().encoding());
        let (decoded, _) = encoding.decode_without_bom_handling(bytes.as_ref());
        let mut value = decoded.into_owned();
        for transform in &self.transforms {
            value = match transform {
                StrTransform::Strip => value.trim().to_string(),
                StrTransform::Lower => value.to_lowercase(),
                StrTransform::Upper => value.to_uppercase(),
            };
        }
        Ok(value)
    }

    pub fn eq(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)? == other))
    }

    pub fn ne(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)? != other))
    }

    pub fn lt(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)?.as_str() < other.as_str()))
    }

    pub fn le(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)?.as_str() <= other.as_str()))
    }

    pub fn gt(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)?.as_str() > other.as_str()))
    }

    pub fn ge(self, other: &str) -> LinePredicate {
        let other = other.to_string();
        Box::new(move |line| Ok(self.value(line)?.as_str() >= other.as_str()))
    }

    pub fn is_in(self, others: &[&str]) -> LinePredicate {
        let others: Vec<String> = others.iter().map(|other| other.to_string()).collect();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(others.iter().any(|other| *other == value))
        })
    }

    pub fn not_in(self, others: &[&str]) -> LinePredicate {
        let others: Vec<String> = others.iter().map(|other| other.to_string()).collect();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(others.iter().all(|other| *other != value))
        })
    }
}

/// Operator over the integer value of a field.
pub struct FwfIntOperator {
    bytes: FwfOperator,
}

impl FwfIntOperator {
    fn value(&self, line: &FwfLine) -> FwfResult<i64> {
        let bytes = self.bytes.value(line)?;
        parse_int(bytes.as_ref()).ok_or_else(|| FwfError::Parse {
            lineno: line.lineno(),
            value: String::from_utf8_lossy(bytes.as_ref()).into_owned(),
        })
    }

    pub fn eq(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? == other))
    }

    pub fn ne(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? != other))
    }

    pub fn lt(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? < other))
    }

    pub fn le(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? <= other))
    }

    pub fn gt(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? > other))
    }

    pub fn ge(self, other: i64) -> LinePredicate {
        Box::new(move |line| Ok(self.value(line)? >= other))
    }

    pub fn is_in(self, others: &[i64]) -> LinePredicate {
        let others = others.to_vec();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(others.contains(&value))
        })
    }

    pub fn not_in(self, others: &[i64]) -> LinePredicate {
        let others = others.to_vec();
        Box::new(move |line| {
            let value = self.value(line)?;
            Ok(!others.contains(&value))
        })
    }
}
