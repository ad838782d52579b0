pub mod academy_file;
pub mod db;
pub mod facebook;
pub mod google_auth;
pub mod groq_llm;
pub mod headlines;
pub mod imgbb;
pub mod sheets;

pub use academy_file::AcademyFile;
pub use db::DbAdapter;
pub use facebook::FacebookAdapter;
pub use google_auth::{ServiceAccountAuth, ServiceAccountKey};
pub use groq_llm::GroqTextAdapter;
pub use headlines::RssHeadlines;
pub use imgbb::ImgbbAdapter;
pub use sheets::{DisabledSheet, GoogleSheetsAdapter};
