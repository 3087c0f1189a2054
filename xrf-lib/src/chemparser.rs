//! Chemical formulas: `H2O`, `Fe.7Mg.3O`, `Mn(SO4)2(H2O)7`, `Zn1e-5Fe3O4`.
//!
//! Symbols are an uppercase letter followed by lowercase letters, so `CO`
//! is carbon monoxide and `Co` cobalt. `D` is read as hydrogen.

use std::collections::BTreeMap;

use crate::elements_db;
use crate::error::{Result, XrfError};

/// Cursor over the bytes of a formula.
struct FormulaParser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FormulaParser<'a> {
    fn new(text: &'a str) -> Self {
        FormulaParser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, what: impl std::fmt::Display) -> XrfError {
        XrfError::InvalidFormula(format!("{what} at position {} of '{}'", self.pos, self.text))
    }

    /// Groups and symbols up to a closing parenthesis or the end.
    fn group(&mut self, depth: usize, out: &mut BTreeMap<String, f64>) -> Result<()> {
        while let Some(ch) = self.peek() {
            match ch {
                b'(' => {
                    self.pos += 1;
                    let mut inner = BTreeMap::new();
                    self.group(depth + 1, &mut inner)?;
                    if self.peek() != Some(b')') {
                        return Err(self.error("missing ')'"));
                    }
                    self.pos += 1;
                    let count = self.count()?;
                    for (symbol, n) in inner {
                        *out.entry(symbol).or_insert(0.0) += n * count;
                    }
                }
                b')' if depth > 0 => return Ok(()),
                b'A'..=b'Z' => {
                    let symbol = self.symbol()?;
                    let count = self.count()?;
                    *out.entry(symbol).or_insert(0.0) += count;
                }
                _ => return Err(self.error(format!("unexpected '{}'", ch as char))),
            }
        }
        Ok(())
    }

    fn symbol(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        while self.peek().is_some_and(|c| c.is_ascii_lowercase()) {
            self.pos += 1;
        }
        let symbol = &self.text[start..self.pos];
        match symbol {
            "D" => Ok("H".to_string()),
            s if elements_db::atomic_number(s).is_some() => Ok(s.to_string()),
            s => Err(XrfError::InvalidFormula(format!(
                "'{s}' is not an element symbol"
            ))),
        }
    }

    /// Optional multiplier after a symbol or group, one when absent.
    fn count(&mut self) -> Result<f64> {
        let start = self.pos;
        self.skip_digits();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.skip_digits();
        }
        if self.pos == start {
            return Ok(1.0);
        }
        // an exponent needs digits, so "Fe2Er" is Fe2 followed by Er
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.skip_digits();
            } else {
                self.pos = mark;
            }
        }
        let digits = &self.text[start..self.pos];
        let parsed = if digits.starts_with('.') {
            format!("0{digits}").parse::<f64>()
        } else {
            digits.parse::<f64>()
        };
        match parsed {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(self.error(format!("invalid number '{digits}'"))),
        }
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }
}

/// Parse a chemical formula into a map of element symbol to atom count.
///
/// # Examples
/// ```
/// let result = xrf::chemparser::chemparse("H2O").unwrap();
/// assert_eq!(result["H"], 2.0);
/// assert_eq!(result["O"], 1.0);
/// ```
pub fn chemparse(formula: &str) -> Result<BTreeMap<String, f64>> {
    let mut parser = FormulaParser::new(formula);
    let mut counts = BTreeMap::new();
    parser.group(0, &mut counts)?;
    if counts.is_empty() {
        return Err(XrfError::InvalidFormula(format!("no elements in '{formula}'")));
    }
    Ok(counts)
}

/// Parse a chemical formula into normalized mass fractions.
///
/// Atom counts are weighted with the standard atomic masses.
pub fn mass_fractions(formula: &str) -> Result<BTreeMap<String, f64>> {
    let counts = chemparse(formula)?;
    let mut fractions = BTreeMap::new();
    let mut total = 0.0;
    for (symbol, count) in counts {
        let mass = elements_db::atomic_mass(&symbol)
            .ok_or_else(|| XrfError::InvalidFormula(format!("'{symbol}' has no atomic mass")))?;
        total += count * mass;
        fractions.insert(symbol, count * mass);
    }
    if total <= 0.0 {
        return Err(XrfError::InvalidFormula(format!("zero weight formula: {formula}")));
    }
    for value in fractions.values_mut() {
        *value /= total;
    }
    Ok(fractions)
}

pub fn validate_formula(formula: &str) -> bool {
    chemparse(formula).is_ok()
}
