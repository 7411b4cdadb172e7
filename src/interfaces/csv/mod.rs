pub mod ledger_writer;
pub mod request_reader;
pub mod response_writer;
