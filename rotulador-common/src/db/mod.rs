//! Database initialization, migrations and repositories

pub mod annotations;
pub mod images;
pub mod init;
pub mod migrations;

pub use annotations::{Annotation, AnnotationRepository, AnnotationStats, AnnotationWithImage, StageValue};
pub use images::{Image, ImageRepository};
pub use init::{connect_in_memory, connect_readonly, init_database};
pub use migrations::run_migrations;
