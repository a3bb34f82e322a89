mod health;
mod stats;
mod url;

pub use health::ping_handler;
pub use stats::stats_handler;
pub use url::{
    delete_user_urls_handler, redirect_handler, shorten_batch_handler, shorten_json_handler,
    shorten_text_handler, user_urls_handler,
};
