pub mod scraper;
pub mod storage;
pub mod telegram;
