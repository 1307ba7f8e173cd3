//! List serial ports that could carry a rig.

use serialport::SerialPortType;

fn main() {
    env_logger::init();

    match serialport::available_ports() {
        Ok(ports) => {
            println!("Found {} serial port(s):", ports.len());
            for (i, port) in ports.iter().enumerate() {
                match &port.port_type {
                    SerialPortType::UsbPort(usb) => println!(
                        "  [{}] {}  USB {:04x}:{:04x}  {}",
                        i,
                        port.port_name,
                        usb.vid,
                        usb.pid,
                        usb.product.as_deref().unwrap_or("-")
                    ),
                    other => println!("  [{}] {}  {:?}", i, port.port_name, other),
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
