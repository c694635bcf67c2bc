pub mod budget;
pub mod cluster;
pub mod dump_tool;
pub mod kube_api;
pub mod registry;
