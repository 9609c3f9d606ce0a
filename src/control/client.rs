//! ONVIF device control client
//!
//! Owns the single ONVIF session: service discovery, profile selection and
//! the PTZ calls themselves. Connection supervision (backoff, attempt
//! versioning) lives in the control loop in [`arbiter`](super::arbiter);
//! this type only knows how to connect once and how to issue one call.

use crate::config::CameraEndpoint;
use crate::control::command::{PtzCommand, Velocity};
use crate::control::soap::{self, LocalName, SoapResponse, SoapTransport};
use crate::control::wsse::xml_escape;
use crate::error::{Error, Result};

const MEDIA_NS: &str = "http://www.onvif.org/ver10/media/wsdl";
const PTZ_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";
const DEVICE_NS: &str = "http://www.onvif.org/ver10/device/wsdl";
const SCHEMA_NS: &str = "http://www.onvif.org/ver10/schema";

const PAN_TILT_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";
const ZOOM_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/ZoomSpaces/VelocityGenericSpace";

/// Established ONVIF session state
#[derive(Debug, Clone)]
struct Session {
    ptz_endpoint: String,
    profile_token: String,
}

/// ONVIF PTZ client over a [`SoapTransport`].
pub struct DeviceControl<T: SoapTransport> {
    transport: T,
    endpoint: CameraEndpoint,
    session: Option<Session>,
}

impl<T: SoapTransport> DeviceControl<T> {
    pub fn new(transport: T, endpoint: CameraEndpoint) -> Self {
        Self {
            transport,
            endpoint,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the session so the next `connect` starts from scratch.
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Establish the session: discover services, pick a PTZ profile.
    ///
    /// Fails with [`Error::Auth`] on rejected credentials (the caller must
    /// not auto-retry that), [`Error::Network`]/[`Error::Protocol`]
    /// otherwise.
    pub async fn connect(&mut self) -> Result<()> {
        self.session = None;

        let device_url = self.endpoint.device_service_url();
        let services = self.call(&device_url, "GetServices", get_services_body()).await?;
        let xaddrs = parse_service_addresses(&services.body);

        // Cameras that omit GetServices XAddrs usually serve everything on
        // the device endpoint.
        let media_endpoint = xaddrs.media.unwrap_or_else(|| device_url.clone());
        let ptz_endpoint = xaddrs.ptz.unwrap_or_else(|| device_url.clone());

        let profiles_resp = self
            .call(&media_endpoint, "GetProfiles", get_profiles_body())
            .await?;
        let profiles = parse_profiles(&profiles_resp.body)?;
        if profiles.is_empty() {
            return Err(Error::Protocol("camera reported no media profiles".into()));
        }

        let profile = match profiles.iter().find(|p| p.has_ptz) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    token = %profiles[0].token,
                    "No PTZ-capable profile advertised, falling back to the first profile"
                );
                &profiles[0]
            }
        };

        tracing::info!(
            profile = %profile.token,
            ptz = profile.has_ptz,
            endpoint = %ptz_endpoint,
            "ONVIF session established"
        );
        self.session = Some(Session {
            ptz_endpoint,
            profile_token: profile.token.clone(),
        });
        Ok(())
    }

    /// Issue one PTZ call.
    ///
    /// Returns as soon as the camera acknowledges; a `Move` keeps the camera
    /// in motion until a later `Stop`. On [`Error::Network`] the session is
    /// dropped so the supervisor reconnects.
    pub async fn send(&mut self, command: PtzCommand) -> Result<()> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| Error::Network("onvif session not established".into()))?;

        let (operation, body) = match command {
            PtzCommand::Move { direction, speed } => (
                "ContinuousMove",
                continuous_move_body(&session.profile_token, direction.velocity(speed)),
            ),
            PtzCommand::Stop => ("Stop", stop_body(&session.profile_token)),
        };

        let result = self.call(&session.ptz_endpoint, operation, body).await;
        if let Err(Error::Network(_)) = &result {
            self.session = None;
        }
        result.map(|_| ())
    }

    async fn call(&self, endpoint: &str, operation: &str, body: String) -> Result<SoapResponse> {
        let envelope = soap::envelope(&self.endpoint.username, &self.endpoint.password, &body)?;
        tracing::trace!(operation, endpoint, "ONVIF request");
        let response = self.transport.post(endpoint, envelope).await?;
        soap::check_response(operation, &response)?;
        Ok(response)
    }
}

fn get_services_body() -> String {
    format!(r#"<GetServices xmlns="{DEVICE_NS}"><IncludeCapability>false</IncludeCapability></GetServices>"#)
}

fn get_profiles_body() -> String {
    format!(r#"<GetProfiles xmlns="{MEDIA_NS}"/>"#)
}

fn continuous_move_body(profile_token: &str, velocity: Velocity) -> String {
    let mut parts = String::new();
    if velocity.has_pan_tilt() {
        parts.push_str(&format!(
            r#"<PanTilt x="{}" y="{}" space="{PAN_TILT_VELOCITY_SPACE}" xmlns="{SCHEMA_NS}"/>"#,
            velocity.pan, velocity.tilt
        ));
    }
    if velocity.has_zoom() {
        parts.push_str(&format!(
            r#"<Zoom x="{}" space="{ZOOM_VELOCITY_SPACE}" xmlns="{SCHEMA_NS}"/>"#,
            velocity.zoom
        ));
    }
    format!(
        r#"<ContinuousMove xmlns="{PTZ_NS}"><ProfileToken>{}</ProfileToken><Velocity>{parts}</Velocity></ContinuousMove>"#,
        xml_escape(profile_token)
    )
}

fn stop_body(profile_token: &str) -> String {
    format!(
        r#"<Stop xmlns="{PTZ_NS}"><ProfileToken>{}</ProfileToken><PanTilt>true</PanTilt><Zoom>true</Zoom></Stop>"#,
        xml_escape(profile_token)
    )
}

#[derive(Debug, Default)]
struct ServiceAddresses {
    media: Option<String>,
    ptz: Option<String>,
}

/// Pull the media and PTZ service XAddrs out of a GetServicesResponse.
fn parse_service_addresses(body: &str) -> ServiceAddresses {
    let mut out = ServiceAddresses::default();
    let Ok(doc) = roxmltree::Document::parse(body) else {
        return out;
    };

    for service in doc.descendants().filter(|n| n.has_tag_name_local("Service")) {
        let namespace = service
            .children()
            .find(|n| n.has_tag_name_local("Namespace"))
            .and_then(|n| n.text())
            .unwrap_or("")
            .trim();
        let xaddr = service
            .children()
            .find(|n| n.has_tag_name_local("XAddr"))
            .and_then(|n| n.text())
            .map(|s| s.trim().to_string());

        match namespace {
            MEDIA_NS => out.media = xaddr,
            PTZ_NS => out.ptz = xaddr,
            _ => {}
        }
    }
    out
}

#[derive(Debug)]
struct ProfileInfo {
    token: String,
    has_ptz: bool,
}

/// Parse a GetProfilesResponse into profile tokens plus PTZ capability.
fn parse_profiles(body: &str) -> Result<Vec<ProfileInfo>> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| Error::Protocol(format!("GetProfilesResponse: {e}")))?;

    let profiles = doc
        .descendants()
        .filter(|n| n.has_tag_name_local("Profiles"))
        .map(|node| {
            let token = node.attribute("token").unwrap_or("").to_string();
            let has_ptz = node
                .descendants()
                .any(|n| n.has_tag_name_local("PTZConfiguration"));
            ProfileInfo { token, has_ptz }
        })
        .filter(|p| !p.token.is_empty())
        .collect();

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles_response(with_ptz: bool) -> String {
        let ptz = if with_ptz {
            r#"<tt:PTZConfiguration token="ptz0"><tt:Name>ptz</tt:Name></tt:PTZConfiguration>"#
        } else {
            ""
        };
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
      <trt:Profiles token="profile_1"><tt:Name>main</tt:Name></trt:Profiles>
      <trt:Profiles token="profile_6"><tt:Name>ptz-stream</tt:Name>{ptz}</trt:Profiles>
    </trt:GetProfilesResponse>
  </s:Body>
</s:Envelope>"#
        )
    }

    #[test]
    fn test_parse_profiles_picks_up_tokens_and_ptz() {
        let profiles = parse_profiles(&profiles_response(true)).unwrap();

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].token, "profile_1");
        assert!(!profiles[0].has_ptz);
        assert_eq!(profiles[1].token, "profile_6");
        assert!(profiles[1].has_ptz);
    }

    #[test]
    fn test_parse_profiles_none_with_ptz() {
        let profiles = parse_profiles(&profiles_response(false)).unwrap();
        assert!(profiles.iter().all(|p| !p.has_ptz));
    }

    #[test]
    fn test_parse_profiles_garbage_is_protocol_error() {
        assert!(parse_profiles("this is not xml").is_err());
    }

    #[test]
    fn test_parse_service_addresses() {
        let body = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <tds:GetServicesResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
      <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace>
        <tds:XAddr>http://192.168.1.10:2020/onvif/media</tds:XAddr>
      </tds:Service>
      <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver20/ptz/wsdl</tds:Namespace>
        <tds:XAddr>http://192.168.1.10:2020/onvif/ptz</tds:XAddr>
      </tds:Service>
    </tds:GetServicesResponse>
  </s:Body>
</s:Envelope>"#;

        let addrs = parse_service_addresses(body);
        assert_eq!(addrs.media.as_deref(), Some("http://192.168.1.10:2020/onvif/media"));
        assert_eq!(addrs.ptz.as_deref(), Some("http://192.168.1.10:2020/onvif/ptz"));
    }

    #[test]
    fn test_continuous_move_body_components() {
        use crate::control::command::Direction;

        let body = continuous_move_body("p1", Direction::UpLeft.velocity(0.4));
        assert!(body.contains("<ProfileToken>p1</ProfileToken>"));
        assert!(body.contains(r#"<PanTilt x="-0.4" y="0.4""#));
        assert!(!body.contains("<Zoom"));

        let body = continuous_move_body("p1", Direction::ZoomIn.velocity(0.4));
        assert!(!body.contains("<PanTilt"));
        assert!(body.contains(r#"<Zoom x="0.4""#));
    }

    #[test]
    fn test_stop_body_halts_both_axes() {
        let body = stop_body("p1");
        assert!(body.contains("<PanTilt>true</PanTilt>"));
        assert!(body.contains("<Zoom>true</Zoom>"));
    }
}
