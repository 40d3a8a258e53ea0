pub mod config;
pub mod external;
pub mod language;
pub mod pacing;
pub mod petscan;
pub mod pipeline;
pub mod publish;
pub mod records;
pub mod report;
pub mod sparql;
