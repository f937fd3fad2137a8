use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "qboard", version, about = "Classroom Q&A backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create an operator account with staff and superuser rights
    CreateSuperuser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Student/Faculty ID
        #[arg(long)]
        std_id: i64,

        #[arg(long)]
        disp_name: String,

        /// IUB or DU
        #[arg(long, default_value = "IUB")]
        institution: String,
    },
}
