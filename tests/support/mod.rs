pub mod toy_engine;
