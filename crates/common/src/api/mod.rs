pub mod distributor;
