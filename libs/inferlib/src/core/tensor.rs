use serde::{Deserialize, Serialize};

/// Tensor dimensions, outermost (batch) first.
pub type Shape = Vec<u64>;

/// Numeric precision of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    I32,
    I8,
    U8,
    #[default]
    Unspecified,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp32 => "FP32",
            Precision::Fp16 => "FP16",
            Precision::I32 => "I32",
            Precision::I8 => "I8",
            Precision::U8 => "U8",
            Precision::Unspecified => "UNSPECIFIED",
        }
    }
}

/// Metadata of a single named tensor: its shape and precision.
///
/// Passthrough endpoints (request-fed pipeline inputs surfaced directly to
/// the response) carry [`TensorInfo::unspecified`], since their metadata is
/// only known once a request arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Shape,
    pub precision: Precision,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, shape: Shape, precision: Precision) -> Self {
        Self {
            name: name.into(),
            shape,
            precision,
        }
    }

    /// Placeholder metadata for tensors whose shape and precision are not
    /// statically known.
    pub fn unspecified() -> Self {
        Self {
            name: String::new(),
            shape: Shape::new(),
            precision: Precision::Unspecified,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.shape.is_empty() && self.precision == Precision::Unspecified
    }

    /// Shape rendered for log lines, e.g. `(1,3,224,224)`.
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("({})", dims.join(","))
    }
}
