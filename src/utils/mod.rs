pub mod json_ext;
