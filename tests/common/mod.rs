//! Common test utilities for gridmet-cfsv2.
//!
//! Member files are generated with the netCDF library and served by a
//! local stand-in for the THREDDS `fileServer` endpoint.

pub mod test_data;
pub mod thredds_stub;
