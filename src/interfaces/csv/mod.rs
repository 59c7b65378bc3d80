//! CSV adapters used by the command-line front end.

pub mod campaign_reader;
pub mod donation_reader;
pub mod summary_writer;

fn reader_builder() -> ::csv::ReaderBuilder {
    let mut builder = ::csv::ReaderBuilder::new();
    builder.trim(::csv::Trim::All).flexible(true);
    builder
}
