pub mod hub_factory;
