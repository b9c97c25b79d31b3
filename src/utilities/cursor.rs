use core::str::FromStr;

/// Walks the comma separated fields of an AT response line.
///
/// Quotes around a field are stripped. Every `skip(n)` corresponds to `n`
/// fields the caller is not interested in.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    rest: Option<&'a str>,
    delimiter: char,
}

impl<'a> Cursor<'a> {
    pub fn new(line: &'a str) -> Self {
        Self::with_delimiter(line, ',')
    }

    pub fn with_delimiter(line: &'a str, delimiter: char) -> Self {
        Self {
            rest: Some(line),
            delimiter,
        }
    }

    /// Start after the first occurrence of `prefix`, e.g. `"+CENG: "`.
    pub fn after(line: &'a str, prefix: &str) -> Option<Self> {
        line.find(prefix)
            .map(|pos| Self::new(&line[pos + prefix.len()..]))
    }

    pub fn next_field(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        let (field, rest) = match rest.find(self.delimiter) {
            Some(pos) => (&rest[..pos], Some(&rest[pos + self.delimiter.len_utf8()..])),
            None => (rest, None),
        };
        self.rest = rest;
        Some(field.trim().trim_matches('"'))
    }

    pub fn skip(&mut self, fields: usize) -> &mut Self {
        for _ in 0..fields {
            self.next_field();
        }
        self
    }

    pub fn next_parsed<T: FromStr>(&mut self) -> Option<T> {
        self.next_field()?.parse().ok()
    }

    pub fn next_hex(&mut self) -> Option<u32> {
        let field = self.next_field()?;
        let field = field
            .strip_prefix("0x")
            .or_else(|| field.strip_prefix("0X"))
            .unwrap_or(field);
        u32::from_str_radix(field, 16).ok()
    }

    pub fn remainder(&self) -> Option<&'a str> {
        self.rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_and_quotes() {
        let mut cursor = Cursor::after("+CENG: 0,\"260,03,1f4e\"", "+CENG: ").unwrap();
        assert_eq!(cursor.next_parsed::<u8>(), Some(0));
        assert_eq!(cursor.next_field(), Some("260"));
        assert_eq!(cursor.next_parsed::<u16>(), Some(3));
        assert_eq!(cursor.next_hex(), Some(0x1f4e));
        assert_eq!(cursor.next_field(), None);
    }

    #[test]
    fn skips_and_hex_prefix() {
        let mut cursor = Cursor::new("LTE,Online,260-03,0x1F4E,27447553");
        assert_eq!(cursor.skip(3).next_hex(), Some(0x1F4E));
        assert_eq!(cursor.next_parsed::<u32>(), Some(27447553));

        let mut op = Cursor::with_delimiter("260-03", '-');
        assert_eq!(op.next_parsed::<u16>(), Some(260));
        assert_eq!(op.next_parsed::<u16>(), Some(3));
    }
}
