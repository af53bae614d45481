// Parser module: chunking, statement scanning and tuple tokenizing for SQL
// dumps, plus the line parser for RouterScan exports.

pub mod chunk;
pub mod insert;
pub mod routerscan;
pub mod tuple;
