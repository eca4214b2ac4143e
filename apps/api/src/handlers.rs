pub mod health;
pub mod qr;
pub mod recent_searches;
