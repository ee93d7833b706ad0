// Database models

pub mod affiliate_referral;
pub mod appointment;
pub mod auth;
pub mod coupon;
pub mod dependent;
pub mod payment;
pub mod refresh_token;
pub mod scheduling_access;
pub mod service;
pub mod system_setting;
pub mod user;
