/// Display version information
pub fn execute() {
    println!("patronage {}", env!("CARGO_PKG_VERSION"));
    println!("Creator subscription service backed by a ledger event log");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        // Version command should not panic
        execute();
    }
}
