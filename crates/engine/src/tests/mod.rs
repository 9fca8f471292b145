mod ingestion;
mod setup;
