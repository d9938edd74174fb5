pub mod health;
pub mod setup;
pub mod wizard;

use axum::{
    Router,
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use tower_http::trace::TraceLayer;

use crate::{
    gate::Route,
    proxy::{self, upgrade},
    state::AppState,
};

/// Every request goes through [`dispatch`]; there are no static routes since
/// which handler applies depends on the setup state at request time.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let setup_state = state.store.setup_state().await;

    let is_upgrade = upgrade::is_upgrade_request(request.headers());
    if is_upgrade {
        return upgrade::handle(&state, setup_state, request).await;
    }

    let route = Route::resolve(setup_state, request.method(), request.uri().path());
    match route {
        Route::Wizard => wizard::serve(&state).await,
        Route::ReadSetup => setup::read(&state).await.into_response(),
        Route::SubmitSetup => setup::submit(&state, request).await.into_response(),
        Route::Health => health::check(&state).await.into_response(),
        Route::Proxy => proxy::handle(&state, request).await,
    }
}
