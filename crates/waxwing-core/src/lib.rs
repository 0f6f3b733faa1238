pub mod error;
pub mod ids;
pub mod progress;
pub mod version;

pub use error::*;
pub use ids::*;
pub use progress::*;
pub use version::*;
