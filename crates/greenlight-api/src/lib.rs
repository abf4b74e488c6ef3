pub mod auth;
pub mod error;
pub mod fanout;
pub mod friends;
pub mod invitations;
pub mod lights;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod realtime;
pub mod reminders;
pub mod service;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};

pub use state::{AppState, AppStateInner};

/// Every HTTP route, grouped by how it is guarded.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(service::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/gateway", get(realtime::ws_upgrade));

    let service_routes = Router::new()
        .route(
            "/api/cron/reminders",
            post(service::cron_reminders).get(service::manual_reminders),
        )
        .route("/api/admin/reminder-logs", get(service::reminder_logs))
        .route("/api/admin/notifications", post(service::system_notification))
        .route("/api/diagnostics/events", get(service::upcoming_events))
        .layer(from_fn_with_state(state.clone(), middleware::require_service_token));

    let protected_routes = Router::new()
        // Identity
        .route("/api/me", get(auth::get_me).patch(auth::update_me))
        .route("/api/me/password", post(auth::change_password))
        // Friends & lists
        .route("/api/users", get(friends::list_users))
        .route("/api/friends", get(friends::list_friends).post(friends::add_friend))
        .route("/api/friends/{friend_id}", delete(friends::remove_friend))
        .route("/api/lists", get(friends::list_lists).post(friends::create_list))
        .route(
            "/api/lists/{list_id}",
            get(friends::get_list)
                .patch(friends::rename_list)
                .delete(friends::delete_list),
        )
        .route("/api/lists/{list_id}/members", post(friends::add_list_member))
        .route(
            "/api/lists/{list_id}/members/{user_id}",
            delete(friends::remove_list_member),
        )
        // Lights
        .route("/api/lights", get(lights::list_my_lights).post(lights::create_light))
        .route("/api/lights/active", get(lights::list_active_lights))
        .route("/api/lights/past", get(lights::list_past_lights))
        .route(
            "/api/lights/{light_id}",
            get(lights::get_light)
                .patch(lights::update_light)
                .delete(lights::delete_light),
        )
        // Invitations
        .route(
            "/api/lights/{light_id}/invitations",
            get(invitations::list_invitations).post(invitations::invite),
        )
        .route("/api/lights/{light_id}/respond", post(invitations::respond))
        .route(
            "/api/lights/{light_id}/invitations/{invitation_id}",
            patch(invitations::set_status).delete(invitations::remove_invitation),
        )
        // Messages
        .route(
            "/api/lights/{light_id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route(
            "/api/lights/{light_id}/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        // Notifications
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/count", get(notifications::count_notifications))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{notification_id}/read", post(notifications::mark_read))
        .route(
            "/api/notifications/{notification_id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/api/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/api/reminders", get(notifications::list_my_reminders))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(service_routes)
        .merge(protected_routes)
        .with_state(state)
}
