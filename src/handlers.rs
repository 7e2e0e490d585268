use actix_web::http::header;
use actix_web::{delete, get, post, put, web, HttpMessage, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Principal, User};
use crate::config::Context;
use crate::errors::JobStoreError;
use crate::job::JobFields;
use crate::store::JobStore;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> Result<(), JobStoreError> {
        let missing: Vec<&'static str> = [
            ("username", &self.username),
            ("password", &self.password),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(JobStoreError::Validation { missing });
        }

        if self.password.len() > auth::MAX_PASSWORD_BYTES {
            return Err(JobStoreError::PasswordTooLong {
                max: auth::MAX_PASSWORD_BYTES,
            });
        }

        Ok(())
    }
}

fn parse_id(value: &str) -> Result<i64, JobStoreError> {
    value.parse().map_err(|err| JobStoreError::ParseId {
        value: value.to_owned(),
        source: err,
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(healthz)
        .service(info)
        .service(list_jobs)
        .service(get_job)
        .service(create_job)
        .service(edit_job)
        .service(delete_job)
        .service(signup)
        .service(login)
        .service(logout);
}

#[get("/healthz")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().body("200 Ok")
}

#[get("/info")]
async fn info() -> web::Json<serde_json::Value> {
    web::Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[get("/jobs")]
async fn list_jobs(store: web::Data<JobStore>) -> Result<HttpResponse, JobStoreError> {
    let jobs = store.list_jobs().await?;

    Ok(HttpResponse::Ok().json(jobs))
}

#[get("/jobs/{id}")]
async fn get_job(
    id: web::Path<String>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let id = parse_id(&id)?;
    let job = store.get_one_job(id).await?;

    Ok(HttpResponse::Ok().json(job))
}

#[post("/jobs")]
async fn create_job(
    principal: Principal,
    form: web::Form<JobFields>,
    ctx: web::Data<Context>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let job = form.into_inner();
    job.validate(ctx.required_fields)?;

    let id = store.create_job_listing(&job).await?;
    info!("{} created job listing {}", principal.username, id);

    Ok(HttpResponse::Ok().body("created job listing"))
}

#[put("/jobs/{id}")]
async fn edit_job(
    principal: Principal,
    id: web::Path<String>,
    form: web::Form<JobFields>,
    ctx: web::Data<Context>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let id = parse_id(&id)?;
    let job = form.into_inner();
    job.validate(ctx.required_fields)?;

    store.edit_a_job_listing(&job, id).await?;
    info!("{} edited job listing {}", principal.username, id);

    Ok(HttpResponse::Ok().body("edited job listing"))
}

#[delete("/jobs/{id}")]
async fn delete_job(
    principal: Principal,
    id: web::Path<String>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let id = parse_id(&id)?;

    store.delete_a_job_listing(id).await?;
    info!("{} deleted job listing {}", principal.username, id);

    Ok(HttpResponse::Ok().body("deleted job listing"))
}

#[post("/signup")]
async fn signup(
    form: web::Form<Credentials>,
    ctx: web::Data<Context>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let credentials = form.into_inner();
    credentials.validate()?;

    let password = auth::hash_password(credentials.password, ctx.bcrypt_cost).await?;
    let user = User {
        username: credentials.username,
        password,
    };

    store.create_user(user.clone()).await?;
    info!("Created user {}", user.username);

    Ok(HttpResponse::Ok().body("created user"))
}

#[post("/login")]
async fn login(
    form: web::Form<Credentials>,
    ctx: web::Data<Context>,
    store: web::Data<JobStore>,
) -> Result<HttpResponse, JobStoreError> {
    let credentials = form.into_inner();
    credentials.validate()?;

    // Unknown users and wrong passwords get the same answer.
    let user = match store.find_user(&credentials.username).await {
        Ok(user) => user,
        Err(JobStoreError::UnknownUser { .. }) => {
            return Err(JobStoreError::InvalidCredentials {})
        }
        Err(err) => return Err(err),
    };

    if !auth::verify_password(credentials.password, user.password).await? {
        return Err(JobStoreError::InvalidCredentials {});
    }

    let token = auth::create_token(&ctx.secret, &user.username, ctx.session_hours)?;
    info!("{} logged in", user.username);

    Ok(HttpResponse::Ok()
        .cookie(auth::session_cookie(token))
        .body("logged in"))
}

#[get("/logout")]
async fn logout(req: HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::Ok();

    if req.cookie(auth::SESSION_COOKIE).is_some() {
        response.header(header::SET_COOKIE, auth::expired_session_cookie());
    }

    response.body("logged out")
}
