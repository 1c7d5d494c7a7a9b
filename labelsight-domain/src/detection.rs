use serde::{Deserialize, Serialize};

use crate::{bb::BbF, result::LsResult};

/// One region reported by the detection service. Without a label only the box is drawn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Detection {
    pub bb: BbF,
    pub label: Option<String>,
}

impl Detection {
    pub fn new(bb: BbF, label: Option<String>) -> Self {
        Self { bb, label }
    }
    pub fn from_tlbr(x1: f64, y1: f64, x2: f64, y2: f64) -> LsResult<Self> {
        Ok(Self {
            bb: BbF::from_tlbr(x1, y1, x2, y2)?,
            label: None,
        })
    }
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

#[test]
fn test_detection() {
    let d = Detection::from_tlbr(1.0, 2.0, 3.0, 5.0)
        .unwrap()
        .with_label("cup");
    assert_eq!(d.bb, BbF::from_arr(&[1.0, 2.0, 2.0, 3.0]));
    assert_eq!(d.label(), Some("cup"));
    let json = serde_json::to_string(&d).unwrap();
    let back: Detection = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}
