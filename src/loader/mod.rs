pub mod ir_loader;
