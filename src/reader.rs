use crate::error::{KonsError, KonsResult};
use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::value::{FloatLiteral, KonsValue};

/// Deepest list nesting the reader accepts.
pub const MAX_NESTING: usize = 512;

/// Recursive-descent reader: parses source text into heap values.
///
/// Atoms are tried as integer, float, symbol, then keyword, rolling the
/// position back after each failed attempt. An attempt that has committed
/// to a prefix (`#`, a sign, an exponent marker) and then runs out of input
/// reports `EndOfInput` instead of failing.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    /// Lists currently open.
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, heap: &'a mut Heap, symbols: &'a mut SymbolTable) -> Self {
        Self::new_at(input, 0, heap, symbols)
    }

    /// A reader that starts at byte offset `pos`. Error positions stay
    /// relative to the whole input.
    pub fn new_at(
        input: &'a str,
        pos: usize,
        heap: &'a mut Heap,
        symbols: &'a mut SymbolTable,
    ) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: pos.min(input.len()),
            heap,
            symbols,
            depth: 0,
        }
    }

    /// Read one expression. Returns None when only whitespace and
    /// comments remain.
    pub fn read(&mut self) -> KonsResult<Option<KonsValue>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let val = self.read_expr()?;
        Ok(Some(val))
    }

    /// Return current position in input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read all expressions from input. Values already read stay rooted
    /// while later ones are read.
    pub fn read_all(&mut self) -> KonsResult<Vec<KonsValue>> {
        let base = self.heap.root_height();
        let mut results = Vec::new();
        let outcome = loop {
            match self.read() {
                Ok(Some(val)) => {
                    self.heap.push_root(val);
                    results.push(val);
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.heap.truncate_roots(base);
        outcome.map(|()| results)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b';') {
                while matches!(self.peek(), Some(ch) if ch != b'\n') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn syntax(&self, message: impl Into<String>) -> KonsError {
        KonsError::syntax(self.pos, message)
    }

    fn read_expr(&mut self) -> KonsResult<KonsValue> {
        self.skip_whitespace_and_comments();

        let ch = self.peek().ok_or(KonsError::EndOfInput)?;
        match ch {
            b'(' => self.read_list(),
            b')' => Err(self.syntax("unexpected ')'")),
            b'.' if self.is_dot_separator() => Err(self.syntax("unexpected '.' outside a list")),
            _ => self.read_atom(),
        }
    }

    fn read_list(&mut self) -> KonsResult<KonsValue> {
        if self.depth >= MAX_NESTING {
            return Err(self.syntax(format!("lists nested deeper than {}", MAX_NESTING)));
        }
        self.depth += 1;
        let result = self.read_list_items();
        self.depth -= 1;
        result
    }

    /// Read a list: `(a b c)`, `(a . b)` or `(a b . c)`.
    /// The head cell is rooted while the rest is read.
    fn read_list_items(&mut self) -> KonsResult<KonsValue> {
        self.advance(); // consume '('
        self.skip_whitespace_and_comments();

        match self.peek() {
            None => return Err(KonsError::EndOfInput),
            Some(b')') => {
                self.advance();
                return Ok(KonsValue::Nil);
            }
            Some(b'.') if self.is_dot_separator() => {
                return Err(self.syntax("'.' before the first list element"));
            }
            _ => {}
        }

        let first = self.read_expr()?;
        let head = self.heap.cons(first, KonsValue::Nil)?;
        let base = self.heap.push_root(head);
        let result = self.read_list_tail(head);
        self.heap.truncate_roots(base);
        result.map(|()| head)
    }

    fn read_list_tail(&mut self, head: KonsValue) -> KonsResult<()> {
        let mut tail = head;
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                None => return Err(KonsError::EndOfInput),
                Some(b')') => {
                    self.advance();
                    return Ok(());
                }
                Some(b'.') if self.is_dot_separator() => {
                    self.advance(); // consume '.'
                    let rest = self.read_dotted_tail()?;
                    self.heap.set_rest(tail, rest)?;
                    return Ok(());
                }
                _ => {
                    let value = self.read_expr()?;
                    let cell = self.heap.cons(value, KonsValue::Nil)?;
                    self.heap.set_rest(tail, cell)?;
                    tail = cell;
                }
            }
        }
    }

    /// Exactly one expression, then the closing paren.
    fn read_dotted_tail(&mut self) -> KonsResult<KonsValue> {
        self.skip_whitespace_and_comments();
        match self.peek() {
            None => return Err(KonsError::EndOfInput),
            Some(b')') => return Err(self.syntax("expected an expression after '.'")),
            Some(b'.') if self.is_dot_separator() => {
                return Err(self.syntax("second '.' in a list"));
            }
            _ => {}
        }

        let rest = self.read_expr()?;
        self.skip_whitespace_and_comments();
        match self.peek() {
            None => Err(KonsError::EndOfInput),
            Some(b')') => {
                self.advance();
                Ok(rest)
            }
            Some(_) => Err(self.syntax("expected ')' after the dotted tail")),
        }
    }

    /// A '.' is a separator when followed by a delimiter.
    fn is_dot_separator(&self) -> bool {
        self.peek() == Some(b'.') && self.peek_at(1).map_or(true, is_delimiter)
    }

    fn at_delimiter(&self) -> bool {
        self.peek().map_or(true, is_delimiter)
    }

    fn read_atom(&mut self) -> KonsResult<KonsValue> {
        let start = self.pos;

        if let Some(n) = self.try_integer()? {
            return self.heap.integer(n);
        }
        self.pos = start;

        if let Some(literal) = self.try_float()? {
            return self.heap.float(literal);
        }
        self.pos = start;

        if let Some(name) = self.try_symbol() {
            let id = self.symbols.intern(&name);
            return self.heap.symbol(id);
        }
        self.pos = start;

        if let Some(name) = self.try_keyword()? {
            let id = self.symbols.intern(&name);
            return self.heap.keyword(id);
        }
        self.pos = start;

        Err(self.syntax(format!("unexpected character '{}'", self.input[start] as char)))
    }

    /// `('#' digit+)? sign? digit+`. Whitespace may follow `#` and the
    /// radix digits.
    fn try_integer(&mut self) -> KonsResult<Option<i64>> {
        let mut radix = None;

        if self.peek() == Some(b'#') {
            self.advance();
            self.skip_whitespace();
            let radix_start = self.pos;
            while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == radix_start {
                return match self.peek() {
                    None => Err(KonsError::EndOfInput),
                    Some(_) => Err(self.syntax("expected radix digits after '#'")),
                };
            }
            let digits = self.slice(radix_start, self.pos);
            let value = digits
                .parse::<u32>()
                .ok()
                .filter(|r| (2..=36).contains(r))
                .ok_or_else(|| KonsError::syntax(radix_start, format!("invalid radix {}", digits)))?;

            // `#<n>r...` is ratio syntax, which this reader does not accept.
            if matches!(self.peek(), Some(b'r' | b'R')) {
                return Ok(None);
            }
            self.skip_whitespace();
            radix = Some(value);
        }

        let text_start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }
        let digits_start = self.pos;
        match radix {
            Some(_) => {
                while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric()) {
                    self.pos += 1;
                }
            }
            None => {
                while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        if self.pos == digits_start {
            if self.peek().is_none() && (radix.is_some() || digits_start > text_start) {
                return Err(KonsError::EndOfInput);
            }
            return Ok(None);
        }
        // An integer prefix of a float or of some longer token.
        if !self.at_delimiter() {
            return Ok(None);
        }

        let text = self.slice(text_start, self.pos);
        i64::from_str_radix(text, radix.unwrap_or(10))
            .map(Some)
            .map_err(|e| {
                KonsError::syntax(text_start, format!("bad integer literal '{}': {}", text, e))
            })
    }

    /// `sign? digit* ('.' digit+)? ([eE] sign? digit+)?` with at least one
    /// mantissa digit.
    fn try_float(&mut self) -> KonsResult<Option<FloatLiteral>> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }
        let mut digits = self.skip_digits();
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
            digits += self.skip_digits();
        }
        if digits == 0 {
            return Ok(None);
        }
        let mantissa = self.slice(start, self.pos).to_string();

        let mut exponent = None;
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.advance();
            let exp_start = self.pos;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            if self.skip_digits() == 0 {
                return match self.peek() {
                    None => Err(KonsError::EndOfInput),
                    Some(_) => Ok(None),
                };
            }
            exponent = Some(self.slice(exp_start, self.pos).to_string());
        }

        if !self.at_delimiter() {
            return Ok(None);
        }
        Ok(Some(FloatLiteral::new(mantissa, exponent)))
    }

    /// `alpha (alnum)*`
    fn try_symbol(&mut self) -> Option<String> {
        let start = self.pos;
        if !matches!(self.peek(), Some(ch) if ch.is_ascii_alphabetic()) {
            return None;
        }
        while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        if !self.at_delimiter() {
            return None;
        }
        Some(self.slice(start, self.pos).to_string())
    }

    /// `'&' alpha (alnum)*`, interned with the ampersand.
    fn try_keyword(&mut self) -> KonsResult<Option<String>> {
        let start = self.pos;
        if self.peek() != Some(b'&') {
            return Ok(None);
        }
        self.advance();
        match self.peek() {
            None => return Err(KonsError::EndOfInput),
            Some(ch) if ch.is_ascii_alphabetic() => {}
            Some(_) => return Ok(None),
        }
        while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        if !self.at_delimiter() {
            return Ok(None);
        }
        Ok(Some(self.slice(start, self.pos).to_string()))
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Input bytes are only ever sliced at ASCII boundaries.
    fn slice(&self, start: usize, end: usize) -> &'a str {
        std::str::from_utf8(&self.input[start..end]).unwrap_or("")
    }
}

fn is_delimiter(ch: u8) -> bool {
    ch.is_ascii_whitespace() || ch == b'(' || ch == b')' || ch == b';'
}

/// Read exactly one expression from a string.
pub fn read_str(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> KonsResult<KonsValue> {
    let mut reader = Reader::new(input, heap, symbols);
    let val = reader.read()?.ok_or(KonsError::EndOfInput)?;
    let base = reader.heap.push_root(val);
    let trailing = reader.read();
    reader.heap.truncate_roots(base);
    match trailing? {
        None => Ok(val),
        Some(_) => Err(KonsError::syntax(reader.position(), "more than one expression")),
    }
}

/// Read all expressions from a string.
pub fn read_all(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> KonsResult<Vec<KonsValue>> {
    let mut reader = Reader::new(input, heap, symbols);
    reader.read_all()
}

/// Read one expression starting at byte offset `pos`.
/// Returns `Ok(Some((value, new_pos)))` or `Ok(None)` if only whitespace/comments remain.
pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
) -> KonsResult<Option<(KonsValue, usize)>> {
    let mut reader = Reader::new_at(input, pos, heap, symbols);
    match reader.read()? {
        Some(val) => Ok(Some((val, reader.position()))),
        None => Ok(None),
    }
}
