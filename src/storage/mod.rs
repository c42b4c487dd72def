pub mod labels_db;
