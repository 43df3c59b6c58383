pub mod csv {
    pub mod deal_writer;
}

pub mod jsonl {
    pub mod update_reader;
}
