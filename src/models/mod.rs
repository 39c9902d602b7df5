pub mod annotation;
pub mod enums;
pub mod provenance;
pub mod stored;
pub mod summary;

pub use annotation::*;
pub use enums::*;
pub use provenance::*;
pub use stored::*;
pub use summary::*;
