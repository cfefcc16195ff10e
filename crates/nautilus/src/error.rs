#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bond length must be strictly positive.
    #[error("bond length is zero or negative: {0}")]
    ZeroBondLength(f64),

    /// The per-atom filter mask does not cover the molecule.
    #[error("filter mask covers {got} atoms, molecule has {expected}")]
    FilterLengthMismatch { expected: usize, got: usize },

    /// The anchor edge used to match existing coordinates has (near) zero
    /// length, so no scale can be derived from it.
    #[error("matching edge has zero length")]
    DegenerateAnchorEdge,

    /// A ring exceeds the maximum size the lattice solver supports.
    #[error("macrocycle of size {size} exceeds the supported maximum {max}")]
    RingTooLarge { size: usize, max: usize },

    /// The boundary walk of a component did not close into a simple cycle.
    /// Never expected on valid connected input.
    #[error("corrupted border")]
    CorruptedBorder,

    /// Nucleus selection found no usable block. Never expected on valid
    /// connected input.
    #[error("cannot find nontrivial component")]
    NoNontrivialBlock,

    /// An internal state-machine invariant was violated.
    #[error("internal layout invariant violated: {0}")]
    InconsistentState(&'static str),

    /// The caller's cancellation handle tripped during coordinate
    /// assignment.
    #[error("layout has been cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;
