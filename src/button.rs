use serde::{Serialize, Serializer};

/// Buttons are laid out on a fixed 16-wide grid; the sequence byte is the
/// cell index in row-major order.
pub const GRID_WIDTH: u8 = 16;

/// Whether a page jump survives the next selection or reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permanence {
    Permanent,
    Temporary,
}

/// Navigation behavior attached to a button, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    None,
    Permanent,
    Temporary,
    GoBack,
}

/// One in-band control action recovered from a record's text spans.
///
/// The variant set is closed: the source device only ever emits these.
/// Targets and page refs are stored exactly as captured from the record
/// (raw names); the resolver rewrites the button's navigation fields but
/// never edits a Function after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    SetPage { target: String, permanence: Permanence },
    GoBackPage,
    GotoHome,
    ClearDisplay,
    RandomChoice { page_ref: String },
    InsertDate,
    SpeakDate,
    InsertTime,
    SpeakTime,
    VoiceSetTemporary { params: String },
    VoiceClearTemporary,
}

impl Function {
    /// Human-readable token used in serialized output. Downstream
    /// consumers never see the in-band byte markers, only these.
    pub fn token(&self) -> String {
        match self {
            Function::SetPage {
                target,
                permanence: Permanence::Permanent,
            } => format!("SET-PAGE({})", target),
            Function::SetPage {
                target,
                permanence: Permanence::Temporary,
            } => format!("SET-PAGE-TEMPORARY({})", target),
            Function::GoBackPage => "GO-BACK".to_string(),
            Function::GotoHome => "GOTO-HOME".to_string(),
            Function::ClearDisplay => "CLEAR-DISPLAY".to_string(),
            Function::RandomChoice { page_ref } => format!("RANDOM({})", page_ref),
            Function::InsertDate => "INSERT-DATE".to_string(),
            Function::SpeakDate => "SPEAK-DATE".to_string(),
            Function::InsertTime => "INSERT-TIME".to_string(),
            Function::SpeakTime => "SPEAK-TIME".to_string(),
            Function::VoiceSetTemporary { params } => format!("VOICE({})", params),
            Function::VoiceClearTemporary => "VOICE-CLEAR".to_string(),
        }
    }
}

impl Serialize for Function {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

/// One decoded on-screen button.
///
/// Created by a format decoder; after construction only `speech`,
/// `navigation_type` and `navigation_target` may change, and only the
/// navigation resolver changes them.
#[derive(Debug, Clone, Serialize)]
pub struct Button {
    /// Owning page id, 4 lowercase hex digits.
    pub page_id: String,
    /// Cell index on the page, row-major.
    pub sequence: u8,
    pub row: u8,
    pub col: u8,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub speech: Option<String>,
    /// In-band control actions, in the order they appeared in the record.
    pub functions: Vec<Function>,
    pub navigation_type: NavigationType,
    /// Starts as raw text captured from the record (a page name); the
    /// resolver replaces it with a page id where it can. A raw string
    /// surviving to the output is a data-quality signal, not an error.
    pub navigation_target: Option<String>,
}

impl Button {
    pub fn new(page_id: u16, sequence: u8) -> Button {
        Button {
            page_id: format!("{:04x}", page_id),
            sequence,
            row: sequence / GRID_WIDTH,
            col: sequence % GRID_WIDTH,
            name: None,
            icon: None,
            speech: None,
            functions: Vec::new(),
            navigation_type: NavigationType::None,
            navigation_target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_position_from_sequence() {
        let b = Button::new(0x0400, 0x23);
        assert_eq!(b.row, 2);
        assert_eq!(b.col, 3);
        let b = Button::new(0x0400, 0xff);
        assert_eq!(b.row, 15);
        assert_eq!(b.col, 15);
    }

    #[test]
    fn page_id_is_lowercase_hex() {
        let b = Button::new(0x04AB, 0);
        assert_eq!(b.page_id, "04ab");
    }

    #[test]
    fn function_tokens() {
        let f = Function::SetPage {
            target: "animals".to_string(),
            permanence: Permanence::Permanent,
        };
        assert_eq!(f.token(), "SET-PAGE(animals)");
        assert_eq!(Function::GotoHome.token(), "GOTO-HOME");
        assert_eq!(
            Function::RandomChoice {
                page_ref: "jokes".to_string()
            }
            .token(),
            "RANDOM(jokes)"
        );
    }

    #[test]
    fn functions_serialize_as_tokens() {
        let f = Function::SetPage {
            target: "home menu".to_string(),
            permanence: Permanence::Temporary,
        };
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, "\"SET-PAGE-TEMPORARY(home menu)\"");
    }
}
