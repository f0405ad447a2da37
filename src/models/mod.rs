pub mod record;

pub use record::{
    Connection, LogRecord, MarkerData, UserMapData, UserMarker, NOT_APPLICABLE, STATUS_FAILURE,
    STATUS_INTERRUPTED, STATUS_SUCCESS,
};
