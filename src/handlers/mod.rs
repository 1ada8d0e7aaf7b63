pub mod employee;

use actix_cors::Cors;
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/employees")
            .route(web::post().to(employee::create_employee)),
    );
}

/// Any origin may submit the form, matching a browser front end on another port.
pub fn cors() -> Cors {
    Cors::permissive()
}
