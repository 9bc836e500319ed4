use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub struct SizeMismatch {
    pub(crate) name: &'static str,
    pub(crate) expected: (u32, u32),
    pub(crate) actual: (u32, u32),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the {} is {}x{}, but must be the same size as its image ({}x{})",
            self.name, self.actual.0, self.actual.1, self.expected.0, self.expected.1
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// No corpus pixel has a positive mask weight, so there is nothing to
    /// copy from
    EmptyCorpus,
    /// No target pixel has a positive mask weight, so there is nothing to
    /// synthesize
    EmptyTarget,
    /// The run was cancelled before the seeding pass completed
    Cancelled,
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// A mask or guidance map doesn't have the size of the image it is paired with
    SizeMismatch(SizeMismatch),
    /// The target and corpus, or the two guidance maps, have a different
    /// number of channels
    ChannelMismatch(u32, u32),
    /// A required input was never given to the session builder
    MissingInput(&'static str),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(
                f,
                "the texture source is empty, does any selection include non-transparent pixels?"
            ),
            Self::EmptyTarget => write!(
                f,
                "the output layer is empty, does any selection have visible pixels in the active layer?"
            ),
            Self::Cancelled => write!(f, "synthesis was cancelled before any pass completed"),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::SizeMismatch(sm) => write!(f, "{}", sm),
            Self::ChannelMismatch(first, second) => write!(
                f,
                "images must have the same number of color channels, but have {} and {}",
                first, second
            ),
            Self::MissingInput(name) => write!(f, "no {} was provided", name),
        }
    }
}
