//! Streaming reader for Les Houches Event (LHE) files.
//!
//! An LHE file is XML-flavoured text:
//! ```text
//! <LesHouchesEvents version="3.0">
//! <header> ... #  Number of Events : 10000 ... </header>
//! <init>
//!  IDBMUP1 IDBMUP2 EBMUP1 EBMUP2 PDFGUP1 PDFGUP2 PDFSUP1 PDFSUP2 IDWTUP NPRUP
//!  XSECUP XERRUP XMAXUP LPRUP            (NPRUP lines)
//! </init>
//! <event>
//!  NUP IDPRUP XWGTUP SCALUP AQEDUP AQCDUP
//!  IDUP ISTUP MOTHUP1 MOTHUP2 ICOLUP1 ICOLUP2 PX PY PZ E M VTIMUP SPINUP   (NUP lines)
//!  [optional trailing blocks: <rwgt>, <mgrwt>, # comments]
//! </event>
//! ...
//! </LesHouchesEvents>
//! ```
//! Files ending in `.gz` are decompressed on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{LheError, Result};
use crate::event::{Event, IdSet, Particle};
use crate::kinematics::FourVector;

/// Boxed line source used by [`LheReader::open`].
pub type LineSource = Box<dyn BufRead + Send>;

/// Beam and process information from the `<init>` block.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    /// PDG ids of the two beams.
    pub beam_ids: [i32; 2],
    /// Beam energies in GeV.
    pub beam_energies: [f64; 2],
    /// Per-subprocess cross sections (pb).
    pub cross_sections: Vec<f64>,
    /// Per-subprocess cross-section uncertainties (pb).
    pub cross_section_errors: Vec<f64>,
}

impl RunInfo {
    /// Sum of the subprocess cross sections.
    pub fn total_cross_section(&self) -> f64 {
        self.cross_sections.iter().sum()
    }
}

/// Metadata found before the first event record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LheHeader {
    /// Event count declared by a `Number of Events : N` header line.
    pub declared_events: Option<u64>,
    /// Parsed `<init>` block.
    pub run: Option<RunInfo>,
}

/// Open an event file for line reading, decompressing `.gz` files.
pub fn open_lines(path: &Path) -> Result<LineSource> {
    let file = File::open(path)
        .map_err(|e| LheError::Data(format!("cannot open {}: {e}", path.display())))?;
    let is_gz = path.extension().and_then(|s| s.to_str()).is_some_and(|s| s.eq_ignore_ascii_case("gz"));
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// `true` for the line that opens an event record.
fn is_event_open(line: &str) -> bool {
    let t = line.trim_start();
    match t.strip_prefix("<event") {
        Some(rest) => rest.starts_with('>') || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

fn is_event_close(line: &str) -> bool {
    line.trim().starts_with("</event>")
}

/// Header metadata plus the canonical event count of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileScan {
    /// Everything found before the first event record.
    pub header: LheHeader,
    /// Number of `<event>` record openings in the whole file.
    ///
    /// This is the canonical event count: it is what [`LheReader`] will
    /// yield and what cross-section normalization divides by.
    pub events: u64,
}

/// Parse the header and count event records in a single pass.
pub fn scan_file(path: &Path) -> Result<FileScan> {
    let src = open_lines(path)?;
    scan(src, &path.display().to_string())
}

fn scan(mut src: impl BufRead, name: &str) -> Result<FileScan> {
    let mut header = LheHeader::default();
    let mut line = String::new();
    let mut init_lines: Option<Vec<String>> = None;
    let mut events = 0u64;

    loop {
        line.clear();
        let read = src
            .read_line(&mut line)
            .map_err(|e| LheError::Data(format!("reading {name}: {e}")))?;
        if read == 0 {
            break;
        }
        if is_event_open(&line) {
            events += 1;
            continue;
        }
        if events > 0 {
            continue;
        }
        let t = line.trim();
        if header.declared_events.is_none() && t.contains("Number of Events") {
            header.declared_events = parse_declared_count(t);
        }
        if t.starts_with("<init") {
            init_lines = Some(Vec::new());
            continue;
        }
        if t.starts_with("</init>") {
            if let Some(lines) = init_lines.take() {
                header.run = parse_init(&lines);
                if header.run.is_none() {
                    tracing::warn!(file = name, "could not parse <init> block");
                }
            }
            continue;
        }
        if let Some(lines) = init_lines.as_mut()
            && !t.is_empty()
            && !t.starts_with('#')
            && !t.starts_with('<')
        {
            lines.push(t.to_string());
        }
    }
    Ok(FileScan { header, events })
}

fn parse_declared_count(line: &str) -> Option<u64> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    parts[1].trim().parse().ok()
}

/// Fortran-style doubles (`1.0D+03`) are accepted alongside the usual forms.
fn parse_f64(tok: &str) -> Option<f64> {
    tok.parse().ok().or_else(|| tok.replace(['D', 'd'], "E").parse().ok())
}

fn parse_init(lines: &[String]) -> Option<RunInfo> {
    let first: Vec<&str> = lines.first()?.split_whitespace().collect();
    if first.len() < 10 {
        return None;
    }
    let beam_ids = [first[0].parse().ok()?, first[1].parse().ok()?];
    let beam_energies = [parse_f64(first[2])?, parse_f64(first[3])?];
    let nprup: usize = first[9].parse().ok()?;

    let mut cross_sections = Vec::with_capacity(nprup);
    let mut cross_section_errors = Vec::with_capacity(nprup);
    for l in lines.iter().skip(1).take(nprup) {
        let f: Vec<&str> = l.split_whitespace().collect();
        if f.len() < 2 {
            return None;
        }
        cross_sections.push(parse_f64(f[0])?);
        cross_section_errors.push(parse_f64(f[1])?);
    }
    if cross_sections.len() != nprup {
        return None;
    }
    Some(RunInfo { beam_ids, beam_energies, cross_sections, cross_section_errors })
}

/// Lazy, single-pass iterator over the events of an LHE stream.
///
/// Yields one [`Event`] per `<event>` record with only the particles whose id
/// is in the include set. After the first error the iterator is exhausted.
pub struct LheReader<R> {
    src: R,
    name: String,
    include: IdSet,
    line: String,
    line_no: u64,
    events_read: u64,
    done: bool,
}

impl LheReader<LineSource> {
    /// Open `path` and stream its events.
    pub fn open(path: impl AsRef<Path>, include: IdSet) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let src = open_lines(&path)?;
        Ok(Self::new(src, include, path.display().to_string()))
    }
}

impl<R: BufRead> LheReader<R> {
    /// Stream events from an already opened source; `name` is used in errors.
    pub fn new(src: R, include: IdSet, name: impl Into<String>) -> Self {
        Self {
            src,
            name: name.into(),
            include,
            line: String::new(),
            line_no: 0,
            events_read: 0,
            done: false,
        }
    }

    /// Number of event records yielded so far.
    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    fn data_err(&self, msg: impl std::fmt::Display) -> LheError {
        LheError::Data(format!("{}:{}: {msg}", self.name, self.line_no))
    }

    /// Read the next line into `self.line`; `false` at end of input.
    fn next_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self
            .src
            .read_line(&mut self.line)
            .map_err(|e| LheError::Data(format!("reading {}: {e}", self.name)))?;
        if n > 0 {
            self.line_no += 1;
        }
        Ok(n > 0)
    }

    fn next_nonblank_line(&mut self) -> Result<bool> {
        loop {
            if !self.next_line()? {
                return Ok(false);
            }
            if !self.line.trim().is_empty() {
                return Ok(true);
            }
        }
    }

    fn read_event(&mut self) -> Result<Option<Event>> {
        // Seek to the next record.
        loop {
            if !self.next_line()? {
                return Ok(None);
            }
            if is_event_open(&self.line) {
                break;
            }
        }

        if !self.next_nonblank_line()? {
            return Err(self.data_err("unexpected end of file in event header"));
        }
        let nup: usize = self
            .line
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| self.data_err(format!("invalid event header: '{}'", self.line.trim())))?;

        let mut particles = Vec::new();
        for _ in 0..nup {
            if !self.next_nonblank_line()? {
                return Err(self.data_err("unexpected end of file in particle block"));
            }
            if let Some(p) = self.parse_particle_line()? {
                particles.push(p);
            }
        }

        // Skip optional trailing blocks up to the closing tag.
        loop {
            if !self.next_line()? {
                return Err(self.data_err("unterminated <event> record"));
            }
            if is_event_close(&self.line) {
                break;
            }
            if is_event_open(&self.line) {
                return Err(self.data_err("nested <event> before </event>"));
            }
        }

        self.events_read += 1;
        Ok(Some(Event::new(particles)))
    }

    fn parse_particle_line(&self) -> Result<Option<Particle>> {
        let fields: Vec<&str> = self.line.split_whitespace().collect();
        if fields.len() < 10 {
            return Err(self.data_err(format!(
                "particle line has {} fields, expected at least 10",
                fields.len()
            )));
        }
        let type_id: i32 = fields[0]
            .parse()
            .map_err(|_| self.data_err(format!("invalid particle id '{}'", fields[0])))?;
        if !self.include.contains(&type_id) {
            return Ok(None);
        }

        let mut p = [0.0f64; 4];
        for (k, slot) in p.iter_mut().enumerate() {
            let tok = fields[6 + k];
            *slot = parse_f64(tok)
                .ok_or_else(|| self.data_err(format!("invalid momentum component '{tok}'")))?;
        }
        let v = FourVector::new(p[0], p[1], p[2], p[3]);
        if !v.is_finite() {
            tracing::debug!(file = %self.name, line = self.line_no, type_id, "non-finite momentum");
            return Ok(Some(Particle { type_id, vector: None }));
        }
        Ok(Some(Particle::new(type_id, v)))
    }
}

impl<R: BufRead> Iterator for LheReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_event() {
            Ok(Some(ev)) => Some(Ok(ev)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
