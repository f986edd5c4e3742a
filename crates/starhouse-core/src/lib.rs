pub mod codec;
pub mod error;
pub mod healpix;
pub mod record;
pub mod schema;
pub mod spatial;
pub mod star;
pub mod value;

pub use codec::Codec;
pub use error::{Error, Result};
pub use record::Record;
pub use schema::{Field, Schema, DEC_COLUMN, HEALPIX_COLUMN, PK_COLUMN, RA_COLUMN};
pub use spatial::SpatialIndexer;
pub use star::Star;
pub use value::{FieldType, Value};
