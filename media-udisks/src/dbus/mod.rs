pub mod bytestring;
