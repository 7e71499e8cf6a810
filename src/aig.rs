//! And-inverter graphs in the AIGER 1.9 format.
//!
//! Literals follow the AIGER convention: variable `v` has the positive
//! literal `2*v` and the negated literal `2*v+1`; literal 0 is the constant
//! false and literal 1 the constant true.

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::str;

use fixedbitset::FixedBitSet;

/// Returns the sign of a literal, i.e. whether it is complemented or not.
pub const fn aiger_sign(lit: u32) -> u32 {
    lit & 1
}

/// Strips the sign of a literal, i.e. returns the uncomplemented version.
pub const fn aiger_strip(lit: u32) -> u32 {
    lit & !1
}

/// Inverts a literal, i.e. toggles the complement state.
pub const fn aiger_not(lit: u32) -> u32 {
    lit ^ 1
}

/// Returns the uncomplemented literal associated to a variable.
pub const fn aiger_var2lit(var: u32) -> u32 {
    var << 1
}

/// Returns the variable associated to a literal.
pub const fn aiger_lit2var(lit: u32) -> u32 {
    lit >> 1
}

/// An input of the circuit.
#[derive(Debug, Clone)]
pub struct Input {
    /// The (uncomplemented) literal of the input.
    pub lit: u32,
    /// The symbol name of the input, if any.
    pub name: Option<String>,
}

/// A latch of the circuit. All latches initialize to zero.
#[derive(Debug, Clone)]
pub struct Latch {
    /// The (uncomplemented) literal of the latch.
    pub lit: u32,
    /// The literal driving the next-state value of the latch.
    pub next: u32,
    /// The symbol name of the latch, if any.
    pub name: Option<String>,
}

/// An output of the circuit.
#[derive(Debug, Clone)]
pub struct Output {
    /// The literal of the output.
    pub lit: u32,
    /// The symbol name of the output, if any.
    pub name: Option<String>,
}

/// An AND gate of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct And {
    /// The (uncomplemented) literal defined by the gate.
    pub lhs: u32,
    /// The first operand literal.
    pub rhs0: u32,
    /// The second operand literal.
    pub rhs1: u32,
}

/// The mode for writing an aiger circuit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AigerMode {
    /// Write the circuit in ASCII format.
    Ascii,
    /// Write the circuit in compressed binary format.
    Binary,
}

/// An error raised while reading or validating an aiger circuit.
#[derive(Debug)]
pub enum AigerError {
    /// An I/O error occurred.
    Io(io::Error),
    /// The input is not a well-formed AIGER file.
    Malformed(String),
    /// The circuit does not have exactly one output.
    OutputCount(usize),
    /// A latch does not initialize to zero.
    UnsupportedReset(u32),
}

impl fmt::Display for AigerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::Malformed(msg) => write!(f, "malformed aiger input: {}", msg),
            Self::OutputCount(n) => write!(
                f,
                "specification must have exactly one output, but has {}",
                n
            ),
            Self::UnsupportedReset(lit) => write!(
                f,
                "latch {} does not initialize to zero, which is not supported",
                lit
            ),
        }
    }
}

impl Error for AigerError {}

impl From<io::Error> for AigerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// An and-inverter graph circuit.
#[derive(Debug, Clone, Default)]
pub struct Aig {
    maxvar: u32,
    inputs: Vec<Input>,
    latches: Vec<Latch>,
    outputs: Vec<Output>,
    ands: Vec<And>,
    comments: Vec<String>,
}

impl Aig {
    /// Returns a new, empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// The maximum variable index of the circuit.
    pub fn maxvar(&self) -> u32 {
        self.maxvar
    }

    /// The inputs of the circuit.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// The latches of the circuit.
    pub fn latches(&self) -> &[Latch] {
        &self.latches
    }

    /// The outputs of the circuit.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// The AND gates of the circuit.
    pub fn ands(&self) -> &[And] {
        &self.ands
    }

    /// The number of AND gates.
    pub fn num_ands(&self) -> usize {
        self.ands.len()
    }

    /// The number of latches.
    pub fn num_latches(&self) -> usize {
        self.latches.len()
    }

    /// Returns whether an input with this symbol name is controllable.
    pub fn is_controllable_name(name: &str) -> bool {
        name.to_lowercase().starts_with("controllable_")
    }

    /// Returns the indices of all controllable inputs.
    pub fn controllable_inputs(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| {
                input
                    .name
                    .as_ref()
                    .map_or(false, |name| Self::is_controllable_name(name))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Checks that the circuit is a valid synthesis specification:
    /// exactly one output.
    pub fn check_synthesis_input(&self) -> Result<(), AigerError> {
        if self.outputs.len() != 1 {
            return Err(AigerError::OutputCount(self.outputs.len()));
        }
        Ok(())
    }

    fn grow_maxvar(&mut self, lit: u32) {
        let var = aiger_lit2var(lit);
        if var > self.maxvar {
            self.maxvar = var;
        }
    }

    /// Allocates a fresh variable and returns its positive literal.
    pub fn new_lit(&mut self) -> u32 {
        self.maxvar += 1;
        aiger_var2lit(self.maxvar)
    }

    /// Adds an input with the given literal.
    pub fn add_input(&mut self, lit: u32, name: Option<String>) {
        self.grow_maxvar(lit);
        self.inputs.push(Input { lit, name });
    }

    /// Adds a latch with the given literal and next-state literal.
    pub fn add_latch(&mut self, lit: u32, next: u32, name: Option<String>) {
        self.grow_maxvar(lit);
        self.grow_maxvar(next);
        self.latches.push(Latch { lit, next, name });
    }

    /// Adds an output driven by the given literal.
    pub fn add_output(&mut self, lit: u32, name: Option<String>) {
        self.grow_maxvar(lit);
        self.outputs.push(Output { lit, name });
    }

    /// Adds an AND gate.
    pub fn add_and(&mut self, lhs: u32, rhs0: u32, rhs1: u32) {
        debug_assert_eq!(aiger_sign(lhs), 0);
        self.grow_maxvar(lhs);
        self.grow_maxvar(rhs0);
        self.grow_maxvar(rhs1);
        self.ands.push(And { lhs, rhs0, rhs1 });
    }

    /// Removes the input with the given literal, if present.
    pub fn remove_input(&mut self, lit: u32) {
        self.inputs.retain(|input| input.lit != lit);
    }

    /// Parses an AIGER circuit in ASCII or binary format.
    pub fn parse(data: &[u8]) -> Result<Self, AigerError> {
        let mut cursor = Cursor::new(data);
        let header = cursor.line()?;
        let mut fields = header.split_whitespace();
        let magic = fields.next().unwrap_or("");
        let binary = match magic {
            "aag" => false,
            "aig" => true,
            other => {
                return Err(AigerError::Malformed(format!(
                    "unknown file format '{}'",
                    other
                )))
            }
        };
        let mut sizes = [0u32; 9];
        let mut num_sizes = 0;
        for field in fields {
            if num_sizes >= sizes.len() {
                return Err(AigerError::Malformed("too many header fields".to_string()));
            }
            sizes[num_sizes] = parse_number(field)?;
            num_sizes += 1;
        }
        if num_sizes < 5 {
            return Err(AigerError::Malformed("incomplete header".to_string()));
        }
        let (maxvar, num_inputs, num_latches, num_outputs, num_ands) =
            (sizes[0], sizes[1], sizes[2], sizes[3], sizes[4]);
        if sizes[5..num_sizes].iter().any(|&n| n != 0) {
            return Err(AigerError::Malformed(
                "bad state, invariant or fairness constraints are not supported".to_string(),
            ));
        }

        let mut aig = Aig {
            maxvar,
            ..Aig::default()
        };

        for idx in 0..num_inputs {
            let lit = if binary {
                aiger_var2lit(idx + 1)
            } else {
                parse_number(cursor.line()?.trim())?
            };
            aig.check_lit(lit)?;
            aig.inputs.push(Input { lit, name: None });
        }
        for idx in 0..num_latches {
            let line = cursor.line()?;
            let mut fields = line.split_whitespace();
            let lit = if binary {
                aiger_var2lit(num_inputs + idx + 1)
            } else {
                parse_number(fields.next().ok_or_else(|| {
                    AigerError::Malformed("missing latch literal".to_string())
                })?)?
            };
            let next = parse_number(
                fields
                    .next()
                    .ok_or_else(|| AigerError::Malformed("missing latch input".to_string()))?,
            )?;
            if let Some(reset) = fields.next() {
                if parse_number(reset)? != 0 {
                    return Err(AigerError::UnsupportedReset(lit));
                }
            }
            aig.check_lit(lit)?;
            aig.check_lit(next)?;
            aig.latches.push(Latch {
                lit,
                next,
                name: None,
            });
        }
        for _ in 0..num_outputs {
            let lit = parse_number(cursor.line()?.trim())?;
            aig.check_lit(lit)?;
            aig.outputs.push(Output { lit, name: None });
        }
        if binary {
            for idx in 0..num_ands {
                let lhs = aiger_var2lit(num_inputs + num_latches + idx + 1);
                let delta0 = cursor.varint()?;
                let rhs0 = lhs
                    .checked_sub(delta0)
                    .ok_or_else(|| AigerError::Malformed("bad and gate delta".to_string()))?;
                let delta1 = cursor.varint()?;
                let rhs1 = rhs0
                    .checked_sub(delta1)
                    .ok_or_else(|| AigerError::Malformed("bad and gate delta".to_string()))?;
                aig.check_lit(lhs)?;
                aig.ands.push(And { lhs, rhs0, rhs1 });
            }
        } else {
            for _ in 0..num_ands {
                let line = cursor.line()?;
                let mut fields = line.split_whitespace();
                let mut next_lit = || -> Result<u32, AigerError> {
                    parse_number(fields.next().ok_or_else(|| {
                        AigerError::Malformed("incomplete and gate".to_string())
                    })?)
                };
                let lhs = next_lit()?;
                let rhs0 = next_lit()?;
                let rhs1 = next_lit()?;
                aig.check_lit(lhs)?;
                aig.check_lit(rhs0)?;
                aig.check_lit(rhs1)?;
                aig.ands.push(And { lhs, rhs0, rhs1 });
            }
        }

        // symbol table and comments
        let mut in_comments = false;
        while let Some(line) = cursor.maybe_line() {
            if in_comments {
                aig.comments.push(line.to_string());
                continue;
            }
            if line == "c" {
                in_comments = true;
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let (kind, rest) = line.split_at(1);
            let mut fields = rest.splitn(2, ' ');
            let pos: usize = fields
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| AigerError::Malformed(format!("bad symbol entry '{}'", line)))?;
            let name = fields.next().unwrap_or("").to_string();
            match kind {
                "i" if pos < aig.inputs.len() => aig.inputs[pos].name = Some(name),
                "l" if pos < aig.latches.len() => aig.latches[pos].name = Some(name),
                "o" if pos < aig.outputs.len() => aig.outputs[pos].name = Some(name),
                _ => {
                    return Err(AigerError::Malformed(format!(
                        "bad symbol entry '{}'",
                        line
                    )))
                }
            }
        }

        Ok(aig)
    }

    fn check_lit(&self, lit: u32) -> Result<(), AigerError> {
        if aiger_lit2var(lit) > self.maxvar {
            Err(AigerError::Malformed(format!(
                "literal {} out of range",
                lit
            )))
        } else {
            Ok(())
        }
    }

    /// Writes the circuit to the given writer in the given mode.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs during writing.
    pub fn write<W: Write>(&self, mut writer: W, mode: AigerMode) -> io::Result<()> {
        match mode {
            AigerMode::Ascii => self.write_ascii(&mut writer),
            AigerMode::Binary => self.reencode().write_binary(&mut writer),
        }
    }

    fn write_symbols<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (idx, input) in self.inputs.iter().enumerate() {
            if let Some(name) = &input.name {
                writeln!(writer, "i{} {}", idx, name)?;
            }
        }
        for (idx, latch) in self.latches.iter().enumerate() {
            if let Some(name) = &latch.name {
                writeln!(writer, "l{} {}", idx, name)?;
            }
        }
        for (idx, output) in self.outputs.iter().enumerate() {
            if let Some(name) = &output.name {
                writeln!(writer, "o{} {}", idx, name)?;
            }
        }
        if !self.comments.is_empty() {
            writeln!(writer, "c")?;
            for comment in &self.comments {
                writeln!(writer, "{}", comment)?;
            }
        }
        Ok(())
    }

    fn write_ascii<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "aag {} {} {} {} {}",
            self.maxvar,
            self.inputs.len(),
            self.latches.len(),
            self.outputs.len(),
            self.ands.len()
        )?;
        for input in &self.inputs {
            writeln!(writer, "{}", input.lit)?;
        }
        for latch in &self.latches {
            writeln!(writer, "{} {}", latch.lit, latch.next)?;
        }
        for output in &self.outputs {
            writeln!(writer, "{}", output.lit)?;
        }
        for and in &self.ands {
            writeln!(writer, "{} {} {}", and.lhs, and.rhs0, and.rhs1)?;
        }
        self.write_symbols(writer)
    }

    fn write_binary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "aig {} {} {} {} {}",
            self.maxvar,
            self.inputs.len(),
            self.latches.len(),
            self.outputs.len(),
            self.ands.len()
        )?;
        for latch in &self.latches {
            writeln!(writer, "{}", latch.next)?;
        }
        for output in &self.outputs {
            writeln!(writer, "{}", output.lit)?;
        }
        for and in &self.ands {
            let (rhs0, rhs1) = if and.rhs0 >= and.rhs1 {
                (and.rhs0, and.rhs1)
            } else {
                (and.rhs1, and.rhs0)
            };
            write_varint(writer, and.lhs - rhs0)?;
            write_varint(writer, rhs0 - rhs1)?;
        }
        self.write_symbols(writer)
    }

    /// Renumbers the circuit into the canonical variable order required by
    /// the binary format: inputs first, then latches, then AND gates in
    /// topological order.
    pub fn reencode(&self) -> Aig {
        let num_vars = self.maxvar as usize + 1;
        let mut map: Vec<u32> = vec![0; num_vars];
        let mut and_of: Vec<Option<usize>> = vec![None; num_vars];
        for (idx, and) in self.ands.iter().enumerate() {
            and_of[aiger_lit2var(and.lhs) as usize] = Some(idx);
        }

        let mut next_var = 0;
        for input in &self.inputs {
            next_var += 1;
            map[aiger_lit2var(input.lit) as usize] = next_var;
        }
        for latch in &self.latches {
            next_var += 1;
            map[aiger_lit2var(latch.lit) as usize] = next_var;
        }

        // order the AND gates topologically
        let mut ordered = Vec::with_capacity(self.ands.len());
        let mut visited = FixedBitSet::with_capacity(num_vars);
        for and in &self.ands {
            let mut stack = vec![aiger_lit2var(and.lhs)];
            while let Some(&var) = stack.last() {
                if visited[var as usize] {
                    stack.pop();
                    continue;
                }
                let idx = match and_of[var as usize] {
                    Some(idx) => idx,
                    None => {
                        visited.insert(var as usize);
                        stack.pop();
                        continue;
                    }
                };
                let gate = self.ands[idx];
                let v0 = aiger_lit2var(gate.rhs0);
                let v1 = aiger_lit2var(gate.rhs1);
                if !visited[v0 as usize] {
                    stack.push(v0);
                } else if !visited[v1 as usize] {
                    stack.push(v1);
                } else {
                    visited.insert(var as usize);
                    stack.pop();
                    next_var += 1;
                    map[var as usize] = next_var;
                    ordered.push(idx);
                }
            }
        }

        let ren = |lit: u32| -> u32 {
            if lit <= 1 {
                lit
            } else {
                aiger_var2lit(map[aiger_lit2var(lit) as usize]) | aiger_sign(lit)
            }
        };

        let mut result = Aig {
            maxvar: next_var,
            ..Aig::default()
        };
        for input in &self.inputs {
            result.inputs.push(Input {
                lit: ren(input.lit),
                name: input.name.clone(),
            });
        }
        for latch in &self.latches {
            result.latches.push(Latch {
                lit: ren(latch.lit),
                next: ren(latch.next),
                name: latch.name.clone(),
            });
        }
        for output in &self.outputs {
            result.outputs.push(Output {
                lit: ren(output.lit),
                name: output.name.clone(),
            });
        }
        for &idx in &ordered {
            let and = self.ands[idx];
            result.ands.push(And {
                lhs: ren(and.lhs),
                rhs0: ren(and.rhs0),
                rhs1: ren(and.rhs1),
            });
        }
        result.comments = self.comments.clone();
        result
    }

    /// Evaluates one step of the circuit for the given latch and input
    /// values. Returns the output values and the next latch values.
    pub fn step(&self, latch_values: &[bool], input_values: &[bool]) -> (Vec<bool>, Vec<bool>) {
        assert_eq!(latch_values.len(), self.latches.len());
        assert_eq!(input_values.len(), self.inputs.len());
        let num_vars = self.maxvar as usize + 1;
        let mut values: Vec<Option<bool>> = vec![None; num_vars];
        values[0] = Some(false);
        let mut and_of: Vec<Option<usize>> = vec![None; num_vars];
        for (idx, and) in self.ands.iter().enumerate() {
            and_of[aiger_lit2var(and.lhs) as usize] = Some(idx);
        }
        for (input, &value) in self.inputs.iter().zip(input_values.iter()) {
            values[aiger_lit2var(input.lit) as usize] = Some(value);
        }
        for (latch, &value) in self.latches.iter().zip(latch_values.iter()) {
            values[aiger_lit2var(latch.lit) as usize] = Some(value);
        }

        let resolve = |values: &mut Vec<Option<bool>>, lit: u32| -> bool {
            let mut stack = vec![aiger_lit2var(lit)];
            while let Some(&var) = stack.last() {
                if values[var as usize].is_some() {
                    stack.pop();
                    continue;
                }
                let idx = and_of[var as usize].expect("undefined variable in circuit");
                let and = self.ands[idx];
                let v0 = values[aiger_lit2var(and.rhs0) as usize];
                let v1 = values[aiger_lit2var(and.rhs1) as usize];
                match (v0, v1) {
                    (Some(v0), Some(v1)) => {
                        let a = v0 != (aiger_sign(and.rhs0) == 1);
                        let b = v1 != (aiger_sign(and.rhs1) == 1);
                        values[var as usize] = Some(a && b);
                        stack.pop();
                    }
                    (None, _) => stack.push(aiger_lit2var(and.rhs0)),
                    (_, None) => stack.push(aiger_lit2var(and.rhs1)),
                }
            }
            values[aiger_lit2var(lit) as usize].unwrap() != (aiger_sign(lit) == 1)
        };

        let outputs = self
            .outputs
            .iter()
            .map(|o| resolve(&mut values, o.lit))
            .collect();
        let next = self
            .latches
            .iter()
            .map(|l| resolve(&mut values, l.next))
            .collect();
        (outputs, next)
    }
}

impl fmt::Display for Aig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_ascii(&mut buffer)
            .expect("writing to a vector cannot fail");
        write!(f, "{}", String::from_utf8_lossy(&buffer))
    }
}

fn parse_number(text: &str) -> Result<u32, AigerError> {
    text.parse()
        .map_err(|_| AigerError::Malformed(format!("expected a number, got '{}'", text)))
}

fn write_varint<W: Write>(writer: &mut W, mut value: u32) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            writer.write_all(&[byte | 0x80])?;
        } else {
            writer.write_all(&[byte])?;
            return Ok(());
        }
    }
}

/// Byte cursor over an AIGER file, mixing line-based and binary reads.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn maybe_line(&mut self) -> Option<&'a str> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(rest.len());
        self.pos += end + 1;
        str::from_utf8(&rest[..end]).ok().map(|s| s.trim_end_matches('\r'))
    }

    fn line(&mut self) -> Result<&'a str, AigerError> {
        self.maybe_line()
            .ok_or_else(|| AigerError::Malformed("unexpected end of file".to_string()))
    }

    fn byte(&mut self) -> Result<u8, AigerError> {
        if self.pos >= self.data.len() {
            return Err(AigerError::Malformed("unexpected end of file".to_string()));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn varint(&mut self) -> Result<u32, AigerError> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let byte = self.byte()?;
            value |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 28 {
                return Err(AigerError::Malformed("varint overflow".to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Aig {
        // one latch fed by an uncontrollable input, error when latch is set
        let mut aig = Aig::new();
        aig.add_input(2, Some("request".to_string()));
        aig.add_input(4, Some("controllable_grant".to_string()));
        aig.add_latch(6, 8, Some("state".to_string()));
        aig.add_and(8, 2, aiger_not(4));
        aig.add_output(6, Some("error".to_string()));
        aig
    }

    #[test]
    fn ascii_roundtrip() {
        let aig = example();
        let mut buffer = Vec::new();
        aig.write(&mut buffer, AigerMode::Ascii).unwrap();
        let parsed = Aig::parse(&buffer).unwrap();
        assert_eq!(parsed.maxvar(), aig.maxvar());
        assert_eq!(parsed.inputs().len(), 2);
        assert_eq!(parsed.latches().len(), 1);
        assert_eq!(parsed.ands().len(), 1);
        assert_eq!(parsed.inputs()[1].name.as_deref(), Some("controllable_grant"));
    }

    #[test]
    fn binary_roundtrip() {
        let aig = example();
        let mut buffer = Vec::new();
        aig.write(&mut buffer, AigerMode::Binary).unwrap();
        let parsed = Aig::parse(&buffer).unwrap();
        assert_eq!(parsed.inputs().len(), 2);
        assert_eq!(parsed.latches().len(), 1);
        assert_eq!(parsed.ands().len(), 1);
        // behaviour is preserved under renumbering
        let (out_a, next_a) = aig.step(&[false], &[true, false]);
        let (out_b, next_b) = parsed.step(&[false], &[true, false]);
        assert_eq!(out_a, out_b);
        assert_eq!(next_a, next_b);
    }

    #[test]
    fn controllable_partition() {
        let aig = example();
        assert_eq!(aig.controllable_inputs(), vec![1]);
        assert!(Aig::is_controllable_name("Controllable_x"));
        assert!(!Aig::is_controllable_name("uncontrollable"));
    }

    #[test]
    fn step_evaluates_gates() {
        let aig = example();
        // request=1, grant=0: latch loads 1
        let (outputs, next) = aig.step(&[false], &[true, false]);
        assert_eq!(outputs, vec![false]);
        assert_eq!(next, vec![true]);
        // error output rises once the latch is set
        let (outputs, _) = aig.step(&[true], &[false, false]);
        assert_eq!(outputs, vec![true]);
    }

    #[test]
    fn rejects_multiple_outputs() {
        let mut aig = example();
        aig.add_output(2, None);
        assert!(matches!(
            aig.check_synthesis_input(),
            Err(AigerError::OutputCount(2))
        ));
    }

    #[test]
    fn rejects_nonzero_reset() {
        let text = b"aag 1 0 1 1 0\n2 2 1\n2\n";
        assert!(matches!(
            Aig::parse(text),
            Err(AigerError::UnsupportedReset(2))
        ));
    }
}
