pub mod app_user;
pub mod onboarding_request;
