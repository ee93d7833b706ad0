// Service layer: business logic between handlers and models

pub mod affiliate;
pub mod agenda;
pub mod coupon;
pub mod expiry_sweeper;
pub mod jwt;
pub mod payment_gateway;
pub mod rate_limit;
pub mod settings;
pub mod subscription;

pub use affiliate::AffiliateService;
pub use agenda::AgendaService;
pub use coupon::CouponService;
pub use jwt::JwtService;
pub use payment_gateway::PaymentGatewayService;
pub use rate_limit::RateLimitService;
pub use settings::SettingsService;
pub use subscription::SubscriptionService;
