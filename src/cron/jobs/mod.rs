pub mod daily_fetch;
