// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS wallet shell via objc2 and PassKit.
//
// Requires compilation with the iOS SDK (Xcode). PassKit has no generated
// objc2 bindings, so its classes are resolved dynamically at runtime and
// messaged through `msg_send!`. All UI-affecting calls are performed on the
// main thread; presentation walks the view-controller hierarchy to find the
// topmost surface, which is this module's concern alone — the engine only
// sees `present_enrollment`.

#![cfg(target_os = "ios")]

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use block2::{Block, RcBlock};
use objc2::rc::Retained;
use objc2::runtime::{AnyClass, AnyObject, NSObject};
use objc2::{define_class, msg_send, MainThreadMarker, MainThreadOnly};
use objc2_foundation::{NSArray, NSData, NSError, NSString};
use objc2_ui_kit::{UIApplication, UIViewController};

use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::{
    ActivationMaterial, AddedPassInfo, BindingMaterial, EncryptionScheme, EnrolledCard,
    FinishVerdict,
};

use crate::traits::*;

/// PassKit encryption scheme constants (`PKEncryptionScheme`).
const ENCRYPTION_SCHEME_ECC_V2: &str = "ECC_V2";
const ENCRYPTION_SCHEME_RSA_V2: &str = "RSA_V2";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Assert that we are on the main thread and return the marker.
fn require_main_thread() -> Result<MainThreadMarker> {
    MainThreadMarker::new()
        .ok_or_else(|| CardBridgeError::Bridge("must be called from the main thread".into()))
}

/// Resolve a PassKit class by name at runtime.
fn passkit_class(name: &str) -> Result<&'static AnyClass> {
    AnyClass::get(&std::ffi::CString::new(name).expect("class name has no NUL"))
        .ok_or_else(|| CardBridgeError::Bridge(format!("PassKit class {name} not found")))
}

/// Find the view controller that should present the enrollment sheet.
///
/// Starts from the key window's root controller and follows
/// `presentedViewController` to the top of the hierarchy, mirroring what
/// every host app ends up needing when a modal is already on screen.
fn presentation_surface(mtm: MainThreadMarker) -> Result<Retained<UIViewController>> {
    let app = UIApplication::sharedApplication(mtm);

    // SAFETY: msg_send! to well-known UIApplication selectors (keyWindow,
    // rootViewController).  MainThreadMarker guarantees main-thread use.
    let mut top: Option<Retained<UIViewController>> = unsafe {
        let window: Option<Retained<AnyObject>> = msg_send![&app, keyWindow];
        match window {
            Some(w) => msg_send![&w, rootViewController],
            None => None,
        }
    };

    // Fall back to the first window carrying a root controller.
    if top.is_none() {
        // SAFETY: `windows` returns NSArray<UIWindow *>; rootViewController
        // is a standard UIWindow selector.
        top = unsafe {
            let windows: Retained<NSArray<AnyObject>> = msg_send![&app, windows];
            let mut found: Option<Retained<UIViewController>> = None;
            for window in windows.iter() {
                let root: Option<Retained<UIViewController>> =
                    msg_send![&window, rootViewController];
                if root.is_some() {
                    found = root;
                    break;
                }
            }
            found
        };
    }

    let mut surface =
        top.ok_or_else(|| CardBridgeError::Bridge("no view controller available".into()))?;

    // Climb to the topmost presented controller.
    loop {
        // SAFETY: presentedViewController is a standard UIViewController
        // selector returning nil at the top of the chain.
        let presented: Option<Retained<UIViewController>> =
            unsafe { msg_send![&surface, presentedViewController] };
        match presented {
            Some(next) => surface = next,
            None => break,
        }
    }

    Ok(surface)
}

/// Copy an `NSData` into an owned byte vector.
fn nsdata_to_vec(data: &NSData) -> Vec<u8> {
    data.to_vec()
}

// ---------------------------------------------------------------------------
// Enrollment sheet delegate (PKAddPaymentPassViewControllerDelegate)
// ---------------------------------------------------------------------------

struct SheetDelegateIvars {
    /// Engine-side callbacks.  Shared, never replaced after init.
    delegate: Arc<dyn EnrollmentDelegate>,
    /// Whether the finish verdict has already been forwarded; the delegate
    /// object outlives the sheet dismissal animation.
    finished: RefCell<bool>,
}

define_class! {
    #[unsafe(super(NSObject))]
    #[thread_kind = MainThreadOnly]
    #[name = "CardbridgeSheetDelegate"]
    #[ivars = SheetDelegateIvars]
    struct SheetDelegate;

    impl SheetDelegate {
        /// The wallet subsystem generated binding material and expects
        /// activation material through the completion handler.
        #[unsafe(method(addPaymentPassViewController:generateRequestWithCertificateChain:nonce:nonceSignature:completionHandler:))]
        fn generate_request(
            &self,
            _controller: &AnyObject,
            certificates: &NSArray<NSData>,
            nonce: &NSData,
            nonce_signature: &NSData,
            handler: &Block<dyn Fn(NonNull<AnyObject>)>,
        ) {
            let material = BindingMaterial {
                certificates: certificates.iter().map(|d| nsdata_to_vec(&d)).collect(),
                nonce: nsdata_to_vec(nonce),
                nonce_signature: nsdata_to_vec(nonce_signature),
            };

            tracing::debug!(
                certificates = material.certificates.len(),
                nonce_len = material.nonce.len(),
                "wallet requested binding material exchange"
            );

            // The handler escapes: it is resolved later, after tokenization.
            let escaping = SendableHandler(RcBlock::copy(handler as *const _ as *mut _)
                .expect("completion handler block copy"));

            let completion: PassHandler = Box::new(move |material: ActivationMaterial| {
                escaping.invoke(material);
            });

            self.ivars()
                .delegate
                .binding_material_requested(material, completion);
        }

        /// The sheet finished: a pass, an error, or a plain dismissal.
        #[unsafe(method(addPaymentPassViewController:didFinishAddingPaymentPass:error:))]
        fn did_finish(
            &self,
            controller: &AnyObject,
            pass: Option<&AnyObject>,
            error: Option<&NSError>,
        ) {
            if self.ivars().finished.replace(true) {
                return;
            }

            let verdict = if let Some(error) = error {
                FinishVerdict::failed(error.localizedDescription().to_string())
            } else if let Some(pass) = pass {
                // SAFETY: PKPaymentPass selectors; each returns NSString.
                let info = unsafe {
                    let type_id: Retained<NSString> = msg_send![pass, passTypeIdentifier];
                    let serial: Retained<NSString> = msg_send![pass, serialNumber];
                    let suffix: Retained<NSString> =
                        msg_send![pass, primaryAccountNumberSuffix];
                    AddedPassInfo {
                        pass_type_identifier: type_id.to_string(),
                        serial_number: serial.to_string(),
                        primary_account_suffix: suffix.to_string(),
                    }
                };
                FinishVerdict::added(info)
            } else {
                FinishVerdict::cancelled()
            };

            // SAFETY: dismissViewControllerAnimated:completion: is a
            // standard UIViewController selector; nil completion.
            unsafe {
                let _: () = msg_send![
                    controller,
                    dismissViewControllerAnimated: true,
                    completion: std::ptr::null::<std::ffi::c_void>()
                ];
            }

            self.ivars().delegate.enrollment_finished(verdict);
        }
    }
}

impl SheetDelegate {
    fn new(mtm: MainThreadMarker, delegate: Arc<dyn EnrollmentDelegate>) -> Retained<Self> {
        let this = Self::alloc(mtm).set_ivars(SheetDelegateIvars {
            delegate,
            finished: RefCell::new(false),
        });
        // SAFETY: plain NSObject init.
        unsafe { msg_send![super(this), init] }
    }
}

/// Wrapper carrying the copied completion block out of the delegate
/// callback and into the engine's tokenization task.
struct SendableHandler(RcBlock<dyn Fn(NonNull<AnyObject>)>);

// SAFETY: PassKit's completion handler may be invoked from any thread; the
// framework marshals internally.  The block is invoked exactly once and
// never aliased after the move.
unsafe impl Send for SendableHandler {}

impl SendableHandler {
    /// Build a `PKAddPaymentPassRequest` from the activation material and
    /// hand it to the wallet subsystem.
    fn invoke(&self, material: ActivationMaterial) {
        let build = || -> Result<()> {
            let request_class = passkit_class("PKAddPaymentPassRequest")?;

            // SAFETY: alloc/init of PKAddPaymentPassRequest and its three
            // NSData property setters.
            unsafe {
                let request: Retained<AnyObject> = msg_send![request_class, new];
                let activation = NSData::with_bytes(&material.activation_data);
                let encrypted = NSData::with_bytes(&material.encrypted_pass_data);
                let ephemeral = NSData::with_bytes(&material.ephemeral_public_key);
                let _: () = msg_send![&request, setActivationData: &*activation];
                let _: () = msg_send![&request, setEncryptedPassData: &*encrypted];
                let _: () = msg_send![&request, setEphemeralPublicKey: &*ephemeral];

                self.0.call((NonNull::from(&*request),));
            }
            Ok(())
        };

        if let Err(e) = build() {
            tracing::error!("failed to resolve wallet completion: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Shell implementation
// ---------------------------------------------------------------------------

/// Main-thread-owned reference to the presented enrollment controller.
///
/// SAFETY: the controller is created, presented, and dismissed on the main
/// thread only; the wrapper exists so the shell itself can be shared
/// across threads while holding it.
struct PresentedController(Retained<AnyObject>);

unsafe impl Send for PresentedController {}

/// PassKit-backed wallet shell.
pub struct IosWalletShell {
    /// The presented enrollment controller, retained so it can be
    /// dismissed and released when the session ends.
    presented: Mutex<Option<PresentedController>>,
}

impl IosWalletShell {
    pub fn new() -> Self {
        Self {
            presented: Mutex::new(None),
        }
    }
}

impl WalletShell for IosWalletShell {
    fn platform_name(&self) -> &str {
        "iOS"
    }
}

impl WalletProbeShell for IosWalletShell {
    fn wallet_available(&self) -> bool {
        match passkit_class("PKPassLibrary") {
            // SAFETY: +isPassLibraryAvailable is a documented class method.
            Ok(class) => unsafe { msg_send![class, isPassLibraryAvailable] },
            Err(_) => false,
        }
    }

    fn can_enroll(&self) -> bool {
        match passkit_class("PKAddPaymentPassViewController") {
            // SAFETY: +canAddPaymentPass is a documented class method.
            Ok(class) => unsafe { msg_send![class, canAddPaymentPass] },
            Err(_) => false,
        }
    }

    fn enrolled_cards(&self) -> Result<Vec<EnrolledCard>> {
        let library_class =
            passkit_class("PKPassLibrary").map_err(|_| CardBridgeError::WalletUnavailable)?;

        // SAFETY: PKPassLibrary init, passesOfType: with PKPassTypePayment
        // (= 1), and PKPaymentPass string accessors.
        unsafe {
            let library: Retained<AnyObject> = msg_send![library_class, new];
            let passes: Retained<NSArray<AnyObject>> =
                msg_send![&library, passesOfType: 1usize];

            let mut cards = Vec::with_capacity(passes.len());
            for pass in passes.iter() {
                let suffix: Option<Retained<NSString>> =
                    msg_send![&pass, primaryAccountNumberSuffix];
                let type_id: Retained<NSString> = msg_send![&pass, passTypeIdentifier];
                let serial: Retained<NSString> = msg_send![&pass, serialNumber];
                if let Some(suffix) = suffix {
                    cards.push(EnrolledCard {
                        suffix: suffix.to_string(),
                        pass_type_identifier: type_id.to_string(),
                        serial_number: serial.to_string(),
                    });
                }
            }
            Ok(cards)
        }
    }
}

impl EnrollmentShell for IosWalletShell {
    fn present_enrollment(
        &self,
        config: &EnrollmentConfig,
        delegate: Arc<dyn EnrollmentDelegate>,
    ) -> Result<()> {
        let mtm = require_main_thread()?;

        let scheme = match config.encryption_scheme {
            EncryptionScheme::EccV2 => ENCRYPTION_SCHEME_ECC_V2,
            EncryptionScheme::RsaV2 => ENCRYPTION_SCHEME_RSA_V2,
        };

        let config_class = passkit_class("PKAddPaymentPassRequestConfiguration")?;

        // SAFETY: initWithEncryptionScheme: is the designated initializer;
        // it returns nil for unsupported schemes, which maps to the
        // construction error class.  Property setters take NSString values.
        let configuration: Retained<AnyObject> = unsafe {
            let alloc: Retained<AnyObject> = msg_send![config_class, alloc];
            let configuration: Option<Retained<AnyObject>> =
                msg_send![&alloc, initWithEncryptionScheme: &*NSString::from_str(scheme)];
            let configuration = configuration.ok_or_else(|| {
                CardBridgeError::Configuration("cannot create enrollment configuration".into())
            })?;

            let _: () = msg_send![
                &configuration,
                setCardholderName: &*NSString::from_str(&config.cardholder_name)
            ];
            let _: () = msg_send![
                &configuration,
                setPrimaryAccountSuffix: &*NSString::from_str(&config.primary_account_suffix)
            ];
            let _: () = msg_send![
                &configuration,
                setLocalizedDescription: &*NSString::from_str(&config.localized_description)
            ];
            let _: () = msg_send![
                &configuration,
                setPrimaryAccountIdentifier:
                    &*NSString::from_str(&config.primary_account_identifier)
            ];
            let _: () = msg_send![
                &configuration,
                setPaymentNetwork: &*NSString::from_str(payment_network_name(config))
            ];
            configuration
        };

        let sheet_delegate = SheetDelegate::new(mtm, delegate);
        let controller_class = passkit_class("PKAddPaymentPassViewController")?;

        // SAFETY: initWithRequestConfiguration:delegate: returns nil when
        // the device refuses enrollment (entitlement missing, restricted).
        let controller: Retained<AnyObject> = unsafe {
            let alloc: Retained<AnyObject> = msg_send![controller_class, alloc];
            let controller: Option<Retained<AnyObject>> = msg_send![
                &alloc,
                initWithRequestConfiguration: &*configuration,
                delegate: &*sheet_delegate
            ];
            controller.ok_or_else(|| {
                CardBridgeError::Configuration(
                    "cannot create enrollment view controller".into(),
                )
            })?
        };

        let surface = presentation_surface(mtm)?;

        // SAFETY: presentViewController:animated:completion: with nil
        // completion; main thread guaranteed by `mtm`.
        unsafe {
            let _: () = msg_send![
                &surface,
                presentViewController: &*controller,
                animated: true,
                completion: std::ptr::null::<std::ffi::c_void>()
            ];
        }

        *self.presented.lock().expect("presented lock poisoned") =
            Some(PresentedController(controller));
        tracing::info!("enrollment sheet presented");
        Ok(())
    }

    fn dismiss_enrollment(&self) {
        if MainThreadMarker::new().is_none() {
            tracing::warn!("dismiss requested off the main thread; ignoring");
            return;
        }
        if let Some(PresentedController(controller)) =
            self.presented.lock().expect("presented lock poisoned").take()
        {
            // SAFETY: standard UIViewController dismissal; the controller
            // may already be off screen, in which case this is a no-op.
            unsafe {
                let _: () = msg_send![
                    &controller,
                    dismissViewControllerAnimated: true,
                    completion: std::ptr::null::<std::ffi::c_void>()
                ];
            }
        }
    }
}

/// `PKPaymentNetwork` constant name for a configured network.
fn payment_network_name(config: &EnrollmentConfig) -> &'static str {
    use cardbridge_core::types::PaymentNetwork;
    match config.payment_network {
        PaymentNetwork::Visa => "Visa",
        PaymentNetwork::Mastercard => "MasterCard",
        PaymentNetwork::Amex => "AmEx",
        PaymentNetwork::Discover => "Discover",
    }
}
