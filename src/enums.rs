use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Signed position along the volume normal
    #[default]
    ImagePositionPatient,
    InstanceNumber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modality {
    Ct,
    RtStruct,
    Other,
}

impl Modality {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "CT" => Modality::Ct,
            "RTSTRUCT" => Modality::RtStruct,
            _ => Modality::Other,
        }
    }
}

/// RT ROI Interpreted Type values this crate cares about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum InterpretedType {
    Bolus,
    Control,
    Other(String),
}

impl InterpretedType {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "BOLUS" => InterpretedType::Bolus,
            "CONTROL" => InterpretedType::Control,
            other => InterpretedType::Other(other.to_owned()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            InterpretedType::Bolus => "BOLUS",
            InterpretedType::Control => "CONTROL",
            InterpretedType::Other(code) => code,
        }
    }
}
