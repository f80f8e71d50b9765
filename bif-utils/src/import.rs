//! importers for foreign recording formats
//!
//! Converters are looked up by format name in a [`ConverterRegistry`]. The registry is
//! filled explicitly, usually with [`ConverterRegistry::with_builtin`] at startup.
use crate::error::{Error, Result};
use bif::{Experiment, Metadata, SessionEvent, SessionId};
use maplit::btreemap;
use serde_json::{json, Value};
use std::{collections::BTreeMap, io::BufRead};
use tracing::{debug, warn};

/// Turns one recording into a subject with a single session
pub trait Converter {
    /// Reads the recording from `input` and adds it to `experiment`
    fn convert(&self, experiment: &mut Experiment, input: &mut dyn BufRead) -> Result<SessionId>;
}

pub type ConverterFactory = fn() -> Box<dyn Converter>;

/// Maps format names and their aliases to converter factories
#[derive(Default)]
pub struct ConverterRegistry {
    factories: BTreeMap<String, ConverterFactory>,
    aliases: BTreeMap<String, String>,
}

impl ConverterRegistry {
    /// A registry with the converters that ship with this crate
    pub fn with_builtin() -> Self {
        let mut res = Self::default();
        res.register("ascii", || Box::new(AsciiConverter));
        res.insert_alias("csv", "ascii");
        res.insert_alias("txt", "ascii");
        res
    }

    pub fn register(&mut self, name: &str, factory: ConverterFactory) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    /// Makes `alias` resolve to the already registered format `name`
    pub fn alias(&mut self, alias: &str, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        if !self.factories.contains_key(&name) {
            return Err(Error::UnknownFormat(name));
        }
        self.insert_alias(alias, &name);
        Ok(())
    }

    fn insert_alias(&mut self, alias: &str, name: &str) {
        self.aliases.insert(alias.to_lowercase(), name.to_lowercase());
    }

    /// Creates a converter for a format name or alias, ignoring case
    pub fn get(&self, name: &str) -> Result<Box<dyn Converter>> {
        let name = name.to_lowercase();
        let resolved = self.aliases.get(&name).unwrap_or(&name);
        self.factories
            .get(resolved)
            .map(|factory| factory())
            .ok_or(Error::UnknownFormat(name))
    }

    /// registered format names with their aliases
    pub fn formats(&self) -> Vec<(String, Vec<String>)> {
        self.factories
            .keys()
            .map(|name| {
                let aliases = self
                    .aliases
                    .iter()
                    .filter(|(_, target)| *target == name)
                    .map(|(alias, _)| alias.clone())
                    .collect();
                (name.clone(), aliases)
            })
            .collect()
    }
}

/// Splits a scaled unit like `uV` into its scale and the base unit
pub fn recognize_scale(unit: &str) -> (f64, &str) {
    let mut chars = unit.chars();
    let scale = match chars.next() {
        Some('p') => 1e-12,
        Some('n') => 1e-9,
        Some('u') | Some('µ') => 1e-6,
        Some('m') => 1e-3,
        Some('k') => 1e3,
        Some('M') => 1e6,
        _ => return (1.0, unit),
    };
    match chars.as_str() {
        "" => (1.0, unit),
        rest => (scale, rest),
    }
}

/// Column oriented text recordings.
///
/// ```text
/// # subject: Subject001
/// # sampling-rate: 512
/// # event: 1.5 Eyes closed
/// Fp1[uV], Fp2[uV]
/// 1.0, 2.0
/// 1.5, 2.5
/// ```
///
/// Comment lines carry `key: value` headers. The first other line holds the channel labels,
/// each with an optional unit in brackets. Columns are separated by commas, or by whitespace
/// if the label line has no comma. Samples are scaled to the base unit.
pub struct AsciiConverter;

struct Column {
    label: String,
    unit: String,
    scale: f64,
    skip: bool,
}

impl Column {
    fn parse(text: &str) -> Self {
        let text = text.trim();
        let (label, unit) = match (text.find('['), text.ends_with(']')) {
            (Some(open), true) => (&text[..open], &text[open + 1..text.len() - 1]),
            _ => (text, ""),
        };
        let (scale, unit) = recognize_scale(unit.trim());
        Self {
            label: label.trim().to_uppercase().replace('.', ""),
            unit: unit.to_owned(),
            scale,
            skip: label.to_lowercase().contains("annotations"),
        }
    }
}

fn split(line: &str, comma: bool) -> Vec<&str> {
    if comma {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn number(line: usize, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| Error::parse(line, format!("{:?}: {}", text, e)))
}

/// `YYYY-MM-DD HH:MM:SS` as six numbers
fn recording_start(text: &str) -> Option<Vec<u32>> {
    let parts = text
        .split(|c: char| c == '-' || c == ':' || c.is_whitespace())
        .filter(|x| !x.is_empty())
        .map(|x| x.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() == 6 {
        Some(parts)
    } else {
        None
    }
}

impl Converter for AsciiConverter {
    fn convert(&self, experiment: &mut Experiment, input: &mut dyn BufRead) -> Result<SessionId> {
        let mut headers = BTreeMap::new();
        let mut events = Vec::new();
        let mut columns: Option<(Vec<Column>, bool)> = None;
        let mut samples: Vec<Vec<f64>> = Vec::new();
        for (i, line) in input.lines().enumerate() {
            let line_no = i + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some((key, value)) = comment.split_once(':') {
                    let (key, value) = (key.trim().to_lowercase(), value.trim());
                    if key == "event" {
                        let (time, name) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
                        events.push(SessionEvent::new(number(line_no, time)?, name.trim()));
                    } else {
                        headers.insert(key, value.to_owned());
                    }
                }
                continue;
            }
            match &columns {
                None => {
                    let comma = line.contains(',');
                    let parsed = split(line, comma).into_iter().map(Column::parse).collect::<Vec<_>>();
                    samples = parsed.iter().map(|_| Vec::new()).collect();
                    columns = Some((parsed, comma));
                }
                Some((cols, comma)) => {
                    let values = split(line, *comma);
                    if values.len() != cols.len() {
                        return Err(Error::parse(
                            line_no,
                            format!("expected {} values, got {}", cols.len(), values.len()),
                        ));
                    }
                    for ((col, value), target) in cols.iter().zip(values).zip(samples.iter_mut()) {
                        if !col.skip {
                            target.push(number(line_no, value)? * col.scale);
                        }
                    }
                }
            }
        }
        let (columns, _) = columns.ok_or_else(|| Error::parse(0, "no channel labels"))?;
        let header = |key: &str| headers.get(key).cloned().unwrap_or_default();

        let mut subject_metadata = btreemap! {
            "name".to_owned() => json!(header("subject")),
            "gender".to_owned() => json!(header("gender")),
        };
        if let Some(age) = headers.get("age").and_then(|x| x.parse::<f64>().ok()) {
            subject_metadata.insert("age".to_owned(), json!(age));
        }
        let subject = experiment.add_subject(subject_metadata)?;

        let mut session_metadata = Metadata::new();
        if let Some(start) = headers.get("start").and_then(|x| recording_start(x)) {
            session_metadata.insert("recording-start-time".to_owned(), json!(start));
        }
        let session = experiment.add_session(subject, session_metadata)?;
        for event in events {
            experiment.add_event(session, event)?;
        }

        let sampling_rate = match headers.get("sampling-rate") {
            Some(rate) => number(0, rate)?,
            None => 0.0,
        };
        let manufacturer = headers
            .get("manufacturer")
            .cloned()
            .unwrap_or_else(|| "unknown".to_owned());
        for (column, data) in columns.into_iter().zip(samples) {
            if column.skip {
                warn!("skipping annotation column {}", column.label);
                continue;
            }
            debug!("importing channel {} with {} samples", column.label, data.len());
            let channel = experiment.add_channel(
                session,
                btreemap! {
                    "label".to_owned() => json!(column.label),
                    "unit".to_owned() => json!(column.unit),
                    "sampling-rate".to_owned() => json!(sampling_rate),
                    "time-offset".to_owned() => json!(0.0),
                    "impedance".to_owned() => json!(0.0),
                    "manufacturer".to_owned() => Value::String(manufacturer.clone()),
                },
            )?;
            experiment.set_data(channel, &data)?;
        }
        Ok(session)
    }
}
