use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::config::ToolsConfig;
use crate::error::{ConvError, Result};
use super::{Backend, ToolCommand};

/// Exit code qpdf uses for "succeeded with warnings"
const QPDF_EXIT_WARNINGS: i32 = 3;

/// Clockwise page rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = ConvError;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees {
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(ConvError::InvalidArgument(format!(
                "rotation must be 90, 180 or 270 degrees, got {}",
                other
            ))),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> u16 {
        rotation.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

impl FromStr for Rotation {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        let degrees = s
            .trim_start_matches('+')
            .parse::<u16>()
            .map_err(|_| ConvError::InvalidArgument(format!("invalid rotation '{}'", s)))?;
        Rotation::try_from(degrees)
    }
}

/// PDF optimizing, rotation and password protection

pub struct QpdfBackend {
    binary_path: String,
}

impl QpdfBackend {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            binary_path: tools.qpdf.clone(),
        }
    }

    pub fn optimize_command(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "PDF optimize")
            .args(["--linearize", "--object-streams=generate", "--recompress-flate"])
            .path(input)
            .path(output)
            .accept_exit_code(QPDF_EXIT_WARNINGS)
    }

    pub fn optimize(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Optimizing PDF {} -> {}", input.display(), output.display());
        self.run(self.optimize_command(input, output), progress)
    }

    pub fn rotate_command(&self, input: &Path, output: &Path, rotation: Rotation) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "PDF rotate")
            .path(input)
            .path(output)
            .arg(format!("--rotate=+{}", rotation))
            .accept_exit_code(QPDF_EXIT_WARNINGS)
    }

    /// Rotate every page clockwise.
    pub fn rotate(
        &self,
        input: &Path,
        output: &Path,
        rotation: Rotation,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Rotating PDF {} by {} -> {}", input.display(), rotation, output.display());
        self.run(self.rotate_command(input, output, rotation), progress)
    }

    /// 256-bit AES; an empty user password lets anyone open the file
    /// with owner restrictions applied.
    pub fn encrypt_command(
        &self,
        input: &Path,
        output: &Path,
        owner_password: &str,
        user_password: &str,
    ) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "PDF encrypt")
            .arg("--encrypt")
            .arg(user_password)
            .arg(owner_password)
            .args(["256", "--"])
            .path(input)
            .path(output)
            .accept_exit_code(QPDF_EXIT_WARNINGS)
    }

    pub fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        owner_password: &str,
        user_password: Option<&str>,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Encrypting PDF {} -> {}", input.display(), output.display());
        let user_password = user_password.unwrap_or(owner_password);
        self.run(self.encrypt_command(input, output, owner_password, user_password), progress)
    }

    pub fn decrypt_command(&self, input: &Path, output: &Path, password: &str) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "PDF decrypt")
            .arg(format!("--password={}", password))
            .arg("--decrypt")
            .path(input)
            .path(output)
            .accept_exit_code(QPDF_EXIT_WARNINGS)
    }

    pub fn decrypt(
        &self,
        input: &Path,
        output: &Path,
        password: &str,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Decrypting PDF {} -> {}", input.display(), output.display());
        self.run(self.decrypt_command(input, output, password), progress)
    }

    fn run(&self, command: ToolCommand, progress: &mut dyn FnMut(f64)) -> Result<()> {
        progress(0.0);
        command.execute()?;
        progress(100.0);
        Ok(())
    }
}

impl Backend for QpdfBackend {
    fn name(&self) -> &'static str {
        "qpdf"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        vec!["pdf"]
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        vec!["pdf"]
    }

    fn external_dependencies(&self) -> Vec<String> {
        vec![self.binary_path.clone()]
    }

    fn check_availability(&self) -> Result<()> {
        ToolCommand::new(&self.binary_path, "Version check").arg("--version").execute()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_optimize_command_puts_input_before_output() {
        let backend = QpdfBackend::new(&ToolsConfig::default());
        let cmd = backend.optimize_command(Path::new("in.pdf"), Path::new("out.pdf"));
        let args: Vec<&OsStr> = cmd.args.iter().map(|a| a.as_os_str()).collect();
        assert_eq!(&args[args.len() - 2..], &[OsStr::new("in.pdf"), OsStr::new("out.pdf")]);
        assert_eq!(args[0], "--linearize");
    }

    fn args_of(cmd: &ToolCommand) -> Vec<String> {
        cmd.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_encrypt_command_orders_passwords() {
        let backend = QpdfBackend::new(&ToolsConfig::default());
        let cmd =
            backend.encrypt_command(Path::new("in.pdf"), Path::new("out.pdf"), "owner", "user");
        assert_eq!(
            args_of(&cmd),
            vec!["--encrypt", "user", "owner", "256", "--", "in.pdf", "out.pdf"]
        );
    }

    #[test]
    fn test_decrypt_and_rotate_commands() {
        let backend = QpdfBackend::new(&ToolsConfig::default());
        let cmd = backend.decrypt_command(Path::new("in.pdf"), Path::new("out.pdf"), "s3cret");
        assert_eq!(args_of(&cmd), vec!["--password=s3cret", "--decrypt", "in.pdf", "out.pdf"]);

        let cmd =
            backend.rotate_command(Path::new("in.pdf"), Path::new("out.pdf"), Rotation::Deg270);
        assert_eq!(args_of(&cmd), vec!["in.pdf", "out.pdf", "--rotate=+270"]);
    }

    #[test]
    fn test_rotation_parsing() {
        assert_eq!("90".parse::<Rotation>().unwrap(), Rotation::Deg90);
        assert_eq!("+180".parse::<Rotation>().unwrap(), Rotation::Deg180);
        assert!("45".parse::<Rotation>().is_err());
        assert!("left".parse::<Rotation>().is_err());
        assert_eq!(Rotation::Deg270.to_string(), "270");
    }
}
