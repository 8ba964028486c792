pub mod purchase_reader;
