// Shared application state handed to every handler

use crate::db::{DieselPool, RedisPool};
use crate::services::{
    AgendaService, JwtService, PaymentGatewayService, RateLimitService, SettingsService,
    SubscriptionService,
};

#[derive(Clone)]
pub struct AppState {
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub jwt: JwtService,
    pub settings: SettingsService,
    pub subscription: SubscriptionService,
    pub agenda: AgendaService,
    pub rate_limit: RateLimitService,
}

impl AppState {
    pub fn new(
        diesel_pool: DieselPool,
        redis_pool: RedisPool,
        jwt: JwtService,
        gateway: PaymentGatewayService,
    ) -> Self {
        let settings = SettingsService::new(redis_pool.clone());
        let subscription = SubscriptionService::new(settings.clone(), gateway);
        let agenda = AgendaService::new(settings.clone());
        let rate_limit = RateLimitService::new(redis_pool.clone());

        Self {
            diesel_pool,
            redis_pool,
            jwt,
            settings,
            subscription,
            agenda,
            rate_limit,
        }
    }
}
