//! Field layout table (`picdata.conf`)
//!
//! ```text
//! # comment
//! STR:B
//! geiger_ticks
//! geiger_hv
//! STR:1
//! soil_temp_1
//! ```
//!
//! Each `STR:<id>` line opens a frame; each following line names the field at
//! the next offset of that frame.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{AcqError, Result};

const FRAME_HEADER: &str = "STR:";

/// One frame the PIC sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    /// Identity token, first token of the frame
    pub id: String,
    /// Field names in payload order
    pub fields: Vec<String>,
}

impl FrameSpec {
    /// Number of payload tokens after the identity
    pub fn expected_count(&self) -> usize {
        self.fields.len()
    }
}

/// Field name to (frame, offset) mapping, immutable after load
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    frames: Vec<FrameSpec>,
    index: HashMap<String, (usize, usize)>,
}

impl FieldLayout {
    /// Read and parse a layout file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcqError::layout(path.display().to_string(), 0, format!("unreadable: {e}"))
        })?;
        let layout = Self::parse(&content, &path.display().to_string())?;
        debug!(
            "Loaded {} frames with {} fields from {}",
            layout.frames.len(),
            layout.field_count(),
            path.display()
        );
        Ok(layout)
    }

    /// Parse layout text; `source` names the file in errors
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let mut frames: Vec<FrameSpec> = Vec::new();
        let mut index = HashMap::new();

        for (number, raw_line) in content.lines().enumerate() {
            let line_no = number + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(id) = line.strip_prefix(FRAME_HEADER) {
                let id = id.trim();
                if id.is_empty() {
                    return Err(AcqError::layout(source, line_no, "frame header without id"));
                }
                if let Some(previous) = frames.last() {
                    if previous.fields.is_empty() {
                        return Err(AcqError::layout(
                            source,
                            line_no,
                            format!("frame {} has no fields", previous.id),
                        ));
                    }
                }
                if frames.iter().any(|f| f.id == id) {
                    return Err(AcqError::layout(
                        source,
                        line_no,
                        format!("duplicate frame {id}"),
                    ));
                }
                frames.push(FrameSpec {
                    id: id.to_string(),
                    fields: Vec::new(),
                });
                continue;
            }

            let frame_idx = frames.len().checked_sub(1).ok_or_else(|| {
                AcqError::layout(source, line_no, format!("field {line} before any frame header"))
            })?;
            if index.contains_key(line) {
                return Err(AcqError::layout(
                    source,
                    line_no,
                    format!("duplicate field {line}"),
                ));
            }

            let frame = &mut frames[frame_idx];
            index.insert(line.to_string(), (frame_idx, frame.fields.len()));
            frame.fields.push(line.to_string());
        }

        match frames.last() {
            None => Err(AcqError::layout(source, 0, "no frames defined")),
            Some(last) if last.fields.is_empty() => Err(AcqError::layout(
                source,
                0,
                format!("frame {} has no fields", last.id),
            )),
            Some(_) => Ok(Self { frames, index }),
        }
    }

    pub fn frames(&self) -> &[FrameSpec] {
        &self.frames
    }

    pub fn frame(&self, id: &str) -> Option<&FrameSpec> {
        self.frames.iter().find(|f| f.id == id)
    }

    /// Frame and offset holding `field`
    pub fn locate(&self, field: &str) -> Option<(&FrameSpec, usize)> {
        self.index
            .get(field)
            .map(|&(frame, offset)| (&self.frames[frame], offset))
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn field_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# housekeeping frame
STR:B
geiger_ticks
geiger_hv

STR:1
soil_temp_1
";

    #[test]
    fn test_parse_offsets() {
        let layout = FieldLayout::parse(SAMPLE, "picdata.conf").unwrap();
        assert_eq!(layout.frames().len(), 2);
        assert_eq!(layout.frame("B").unwrap().expected_count(), 2);

        let (frame, offset) = layout.locate("geiger_hv").unwrap();
        assert_eq!(frame.id, "B");
        assert_eq!(offset, 1);

        let (frame, offset) = layout.locate("soil_temp_1").unwrap();
        assert_eq!(frame.id, "1");
        assert_eq!(offset, 0);
        assert!(layout.locate("missing").is_none());
    }

    #[test]
    fn test_field_before_header() {
        let err = FieldLayout::parse("geiger_ticks\nSTR:B\n", "picdata.conf").unwrap_err();
        match err {
            AcqError::LayoutError { line, reason, .. } => {
                assert_eq!(line, 1);
                assert!(reason.contains("before any frame header"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicates_and_empty_frames() {
        assert!(FieldLayout::parse("STR:B\na\na\n", "x").is_err());
        assert!(FieldLayout::parse("STR:B\na\nSTR:B\nb\n", "x").is_err());
        assert!(FieldLayout::parse("STR:B\nSTR:1\nb\n", "x").is_err());
        assert!(FieldLayout::parse("STR:B\na\nSTR:1\n", "x").is_err());
        assert!(FieldLayout::parse("# nothing\n", "x").is_err());
    }

    #[test]
    fn test_unreadable_file() {
        assert!(matches!(
            FieldLayout::load("/nonexistent/picdata.conf"),
            Err(AcqError::LayoutError { .. })
        ));
    }
}
