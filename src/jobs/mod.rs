pub mod token_sweeper;
