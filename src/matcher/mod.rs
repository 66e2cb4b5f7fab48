pub mod banish;
pub mod cluster;
pub mod similarity;
pub mod validator;

// Re-export the main types
pub use self::banish::Banisher;
pub use self::cluster::{
    cluster_coverage,
    exceeds_file_similarity,
    match_coverage,
    sequences,
    Clusterer,
};
pub use self::similarity::{alignment_ratio, quick_ratio};
pub use self::validator::{Rejection, Validator};
