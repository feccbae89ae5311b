//! Common utilities for the flock graph framework.

pub mod error;

pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    use crate::error::Error;

    #[test]
    fn display_names_the_vertex() {
        let err = Error::DegreeUnavailable(42);
        assert_eq!(err.to_string(), "degree for vertex 42 was never received");
    }
}
