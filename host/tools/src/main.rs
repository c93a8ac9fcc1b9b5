//! Streams a G-code file to the board: `tools <serial-port> <file>`.
//!
//! Lines are sent one at a time, and after an `M10026` the tool waits for the job
//! to end before sending the next line. An `M410` in the file therefore reaches the
//! board only after the previous job finished and can't stop it; to interrupt a
//! running job send `M410` from a separate terminal on the same port.

use std::env;
use std::fs;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::time::Duration;

use parser::gcode::{GCodeParser, GCommand};

const BAUD_RATE: u32 = 19200;
// the board prints a line at least every settling interval while a job runs
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const FAILURES: [&str; 4] = [
    "Invalid Anode Pin",
    "Anode Pin must be a PWM Pin",
    "Invalid Sensor Pin",
    "Sensor read failure",
];

// sent with a "[<ms>] [DISPATCHER] " prefix when the board has no room for the job
const BUSY: &str = "Electroplating busy";

// last line the board sends for a plating job
fn ends_job(reply: &str) -> bool {
    let reply = reply.trim_end();
    reply == "Done" || FAILURES.contains(&reply) || reply.ends_with(BUSY)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let serialport = args.get(1).expect("Serial port not specified");
    let file_path = args.get(2).expect("File not specified");

    let file = fs::File::open(file_path).expect("File not found");
    let bufreader = BufReader::new(file);

    let mut port = serialport::new(serialport, BAUD_RATE)
        .timeout(REPLY_TIMEOUT)
        .open()
        .expect("Failed to open port");
    let mut replies = BufReader::new(port.try_clone().expect("Failed to clone port"));

    let parser = GCodeParser::new();
    for (n, l) in bufreader.lines().enumerate() {
        let Ok(mut line) = l else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parser.parse(&line) else {
            eprintln!("line {}: skipping unknown command {}", n + 1, line);
            continue;
        };

        line.push('\n');
        if port.write_all(line.as_bytes()).is_err() {
            eprintln!("line {}: failed to send", n + 1);
            continue;
        }
        print!("{} sent", line);

        if let GCommand::M10026(_) = command {
            let mut reply = String::new();
            loop {
                reply.clear();
                match replies.read_line(&mut reply) {
                    Ok(0) => break,
                    Ok(_) => {
                        print!("{}", reply);
                        if ends_job(&reply) {
                            break;
                        }
                    }
                    Err(e) => {
                        eprintln!("no reply from the board: {}", e);
                        break;
                    }
                }
            }
        }
    }
}
