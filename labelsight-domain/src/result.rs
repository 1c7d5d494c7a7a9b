use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
};

/// Everything that can go wrong while annotating a single image. Only
/// [`LsError::SurfaceUnavailable`] points to the environment, all other variants are bound to
/// the image or detection list at hand.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum LsError {
    /// The input bytes are not a decodable raster image.
    Decode(String),
    /// The drawing backend cannot be created, e.g., the configured font is missing.
    SurfaceUnavailable(String),
    /// Text metrics are not available for the configured font.
    Measurement(String),
    /// The annotated canvas could not be serialized.
    Encode(String),
    /// The detection service failed or answered with something unusable.
    Prediction(String),
    Other(String),
}
impl LsError {
    pub fn new(msg: &str) -> LsError {
        LsError::Other(msg.to_string())
    }
    pub fn msg(&self) -> &str {
        match self {
            Self::Decode(msg)
            | Self::SurfaceUnavailable(msg)
            | Self::Measurement(msg)
            | Self::Encode(msg)
            | Self::Prediction(msg)
            | Self::Other(msg) => msg,
        }
    }
    fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode error",
            Self::SurfaceUnavailable(_) => "surface unavailable",
            Self::Measurement(_) => "measurement error",
            Self::Encode(_) => "encode error",
            Self::Prediction(_) => "prediction error",
            Self::Other(_) => "error",
        }
    }
    /// Whether the error is tied to the environment rather than to one image.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::SurfaceUnavailable(_))
    }
}
impl Display for LsError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.msg())
    }
}
impl Error for LsError {}
impl From<&str> for LsError {
    fn from(value: &str) -> Self {
        LsError::new(value)
    }
}
/// Result type of labelsight with [`LsError`](LsError) as error type.
pub type LsResult<U> = Result<U, LsError>;

/// Creates an [`LsError::Other`](LsError) with a formatted message.
/// ```rust
/// use labelsight_domain::{lserr, LsError};
/// assert_eq!(lserr!("some error {}", 1), LsError::new(format!("some error {}", 1).as_str()));
/// ```
#[macro_export]
macro_rules! lserr {
    ($s:literal) => {
        $crate::LsError::new(format!($s).as_str())
    };
    ($s:literal, $( $exps:expr ),*) => {
        $crate::LsError::new(format!($s, $($exps,)*).as_str())
    }
}

pub fn to_ls<E: Debug>(e: E) -> LsError {
    lserr!(
        "original error type is '{:?}', error message is '{:?}'",
        std::any::type_name::<E>(),
        e
    )
}

#[test]
fn test_display() {
    let e = LsError::Decode("not a png".into());
    assert_eq!(e.to_string(), "decode error: not a png");
    assert_eq!(e.msg(), "not a png");
    assert!(!e.is_fatal_for_run());
    assert!(LsError::SurfaceUnavailable("no font".into()).is_fatal_for_run());
    let e: LsError = "plain".into();
    assert_eq!(e, LsError::Other("plain".into()));
}
