//! Detection replay files.
//!
//! A header line, then one box per line as
//! `label xmin xmax ymin ymax confidence`, with `--` closing each batch.

use std::io::BufRead;
use std::path::Path;

use crate::detection::Detection;
use crate::error::Error;

const TWO_WORD_PREFIXES: [&str; 12] = [
    "traffic", "fire", "stop", "parking", "sports", "baseball", "tennis", "wine", "hot", "cell",
    "teddy", "hair",
];

const BATCH_SEPARATOR: &str = "--";

#[derive(Debug, Default, Clone)]
pub struct ReplayFile {
    batches: Vec<Vec<Detection>>,
}

impl ReplayFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;

        Self::parse(std::io::BufReader::new(file))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut batches = Vec::new();
        let mut current = Vec::new();

        for (idx, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if line == BATCH_SEPARATOR {
                batches.push(std::mem::take(&mut current));
                continue;
            }

            current.push(parse_line(line, idx + 1)?);
        }

        if !current.is_empty() {
            batches.push(current);
        }

        Ok(Self { batches })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    #[inline]
    pub fn batch(&self, index: usize) -> &[Detection] {
        self.batches.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Detection, Error> {
    let mut fields: Vec<&str> = line.split_whitespace().collect();

    let label = if fields.len() > 1 && TWO_WORD_PREFIXES.contains(&fields[0]) {
        let joined = format!("{}{}", fields[0], fields[1]);
        fields.drain(..2);
        joined
    } else {
        fields.remove(0).to_string()
    };

    if fields.len() != 5 {
        return Err(Error::ReplayParse {
            line: line_no,
            reason: format!("expected 5 numeric fields after label, got {}", fields.len()),
        });
    }

    let mut values = [0f32; 5];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = field.parse().map_err(|_| Error::ReplayParse {
            line: line_no,
            reason: format!("not a number: {:?}", field),
        })?;
    }

    let [xmin, xmax, ymin, ymax, confidence] = values;

    Ok(Detection {
        label,
        xmin,
        xmax,
        ymin,
        ymax,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "header\n\
        car 10 60 20 50 0.91\n\
        traffic light 100 110 5 30 0.55\n\
        --\n\
        --\n\
        truck 200 300 100 180 0.8\n";

    #[test]
    fn parses_batches_and_joins_two_word_labels() {
        let replay = ReplayFile::parse(SAMPLE.as_bytes()).unwrap();

        assert_eq!(replay.len(), 3);
        assert_eq!(replay.batch(0).len(), 2);
        assert_eq!(replay.batch(0)[1].label, "trafficlight");
        assert_eq!(replay.batch(0)[1].xmax, 110.0);
        assert!(replay.batch(1).is_empty());
        assert_eq!(replay.batch(2)[0].label, "truck");
        assert!(replay.batch(7).is_empty());
    }

    #[test]
    fn reports_line_of_malformed_entry() {
        let err = ReplayFile::parse("header\ncar 1 2 x 4 0.5\n".as_bytes()).unwrap_err();

        match err {
            Error::ReplayParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
