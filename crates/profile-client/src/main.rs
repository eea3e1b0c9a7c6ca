use anyhow::{bail, Result};
use profile_client::{
    ApiClient, ApiError, AuthGate, AuthSnapshot, GateOptions, GateView, Navigator, SessionUser,
};
use profile_shared::{api::UpdateProfileRequest, Role, User};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turns gate redirects into instructions on the terminal.
#[derive(Default)]
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&mut self, path: &str) {
        match path {
            "/login" => eprintln!("Not logged in. Run `profile-cli login <email> <password>` first."),
            "/dashboard" => eprintln!("Your account's role is not allowed to run this command."),
            other => eprintln!("Redirected to {}", other),
        }
    }
}

fn print_usage() {
    println!("Usage: profile-cli <COMMAND>");
    println!();
    println!("Commands:");
    println!("  login <EMAIL> <PASSWORD> [--id-token <TOKEN>]  Log in and store the session");
    println!("  logout                                          Forget the stored session");
    println!("  profile                                         Show your profile");
    println!("  update [--username V] [--email V] [--phone V]");
    println!("         [--picture V] [--display-name V]         Update your profile");
    println!("  admin                                           Show session details (admins only)");
}

fn print_user(user: &User) {
    println!("id:           {}", user.id);
    println!("email:        {}", user.email);
    println!("role:         {}", user.role);
    let optional = [
        ("username", &user.username),
        ("display name", &user.display_name),
        ("full name", &user.full_name),
        ("phone", &user.phone_number),
        ("picture", &user.profile_picture_url),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            println!("{:<13} {}", format!("{}:", label), value);
        }
    }
}

/// Runs the auth check behind the gate; `None` means the gate redirected.
async fn guarded(api: &ApiClient, options: GateOptions) -> Result<Option<User>> {
    let mut gate = AuthGate::new(TerminalNavigator, options);
    tracing::debug!(view = ?gate.view(), "Checking session");

    let user = if api.has_valid_session() {
        match api.me().await {
            Ok(user) => Some(user),
            Err(ApiError::Unauthorized) | Err(ApiError::NotFound) => None,
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    gate.update(AuthSnapshot::resolved(user.as_ref().map(SessionUser::from)));

    match gate.view() {
        GateView::Protected => Ok(user),
        GateView::Loading | GateView::Nothing => Ok(None),
    }
}

fn parse_update(args: &[String]) -> Result<UpdateProfileRequest> {
    let mut req = UpdateProfileRequest::default();
    let mut i = 0;
    while i < args.len() {
        let Some(value) = args.get(i + 1).cloned() else {
            bail!("{} requires a value", args[i]);
        };
        match args[i].as_str() {
            "--username" => req.username = Some(value),
            "--email" => req.email = Some(value),
            "--phone" => req.phone_number = Some(value),
            "--picture" => req.profile_picture_url = Some(value),
            "--display-name" => req.display_name = Some(value),
            other => bail!("Unknown option: {}", other),
        }
        i += 2;
    }
    Ok(req)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "profile_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let server_url = std::env::var("PROFILE_SERVER_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let mut api = ApiClient::new(&server_url);
    if let Err(e) = api.load_session() {
        tracing::warn!("Ignoring stored session: {:#}", e);
    }

    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "login" => {
            let (Some(email), Some(password)) = (args.get(1), args.get(2)) else {
                bail!("login requires <EMAIL> <PASSWORD>");
            };
            let id_token = match args.get(3).map(String::as_str) {
                Some("--id-token") => args.get(4).map(String::as_str),
                Some(other) => bail!("Unknown option: {}", other),
                None => None,
            };
            let user = api.login(email, password, id_token).await?;
            println!("Logged in as {} ({})", user.email, user.role);
        }
        "logout" => {
            api.logout()?;
            println!("Logged out");
        }
        "profile" => {
            if guarded(&api, GateOptions::default()).await?.is_some() {
                print_user(&api.get_profile().await?);
            }
        }
        "update" => {
            let req = parse_update(&args[1..])?;
            if guarded(&api, GateOptions::default()).await?.is_some() {
                let user = api.update_profile(&req).await?;
                println!("Profile updated");
                print_user(&user);
            }
        }
        "admin" => {
            if let Some(user) = guarded(&api, GateOptions::with_roles(&[Role::Admin])).await? {
                print_user(&user);
                if let Some(session) = api.session() {
                    println!("session user: {}", session.user_id);
                }
            }
        }
        "--help" | "-h" | "help" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
