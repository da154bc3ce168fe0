pub mod clear;
pub mod init;
