pub mod credentials;
pub mod transcripts;
