/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/
mod relay;
mod server;

const GREETING: &str = "220 relay.example.com Service ready\r\n";

const EHLO: &str = "250-relay.example.com\r\n\
                    250-8BITMIME\r\n\
                    250-SMTPUTF8\r\n\
                    250-PIPELINING\r\n\
                    250 SIZE 10000000\r\n";

const ENVELOPE: &str = "MAIL FROM:<app@client.example.com>\r\n\
                        RCPT TO:<john.doe@example.org>\r\n\
                        DATA\r\n";

const ENVELOPE_OK: &str = "250 Ok\r\n\
                           250 Ok\r\n\
                           354 Start mail input; end with <CRLF>.<CRLF>\r\n";

const QUIT: &str = "221 Service closing transmission channel\r\n";

/// The DATA payload of `message`, terminated.
fn payload(message: &[u8]) -> String {
    format!("{}.\r\n", String::from_utf8_lossy(message))
}
